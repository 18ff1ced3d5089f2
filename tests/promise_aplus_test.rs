#[cfg(test)]
mod tests {
    use futures::executor::LocalPool;
    use promise_aplus::scheduler::{self, LocalSpawnScheduler};
    use promise_aplus::{
        Callback, Deferred, Error, Handler, Object, Promise, PromiseState, ThenFn, Thenable, Value,
    };
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<Value>>>, impl Fn() -> Handler) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let handler = move || {
            let sink = sink.clone();
            Handler::new(move |value| {
                sink.borrow_mut().push(value.clone());
                Ok(value)
            })
        };
        (log, handler)
    }

    #[test]
    fn test_resolve_then_runs_handler_once_asynchronously() {
        let (log, record) = recorder();
        Promise::resolve(Value::from(5)).then_with(record(), Handler::none());
        assert!(log.borrow().is_empty());
        scheduler::run_microtasks();
        assert_eq!(*log.borrow(), vec![Value::from(5)]);
        scheduler::run_microtasks();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_second_resolve_has_no_effect() {
        let deferred = Deferred::new();
        deferred.resolve.call("first");
        deferred.resolve.call("second");
        deferred.reject.call("third");
        assert_eq!(deferred.promise.state(), PromiseState::Fulfilled);
        assert_eq!(deferred.promise.value(), Some(Value::from("first")));
    }

    #[test]
    fn test_then_returns_new_promise_in_every_state() {
        let pending = Deferred::new().promise;
        let fulfilled = Promise::resolve(Value::from(1));
        let rejected = Promise::reject(Value::from(2));
        for source in [pending, fulfilled, rejected] {
            let dependent = source.then_with(Handler::none(), Handler::none());
            assert!(!dependent.ptr_eq(&source));
            assert!(dependent.is_pending());
        }
        scheduler::run_microtasks();
    }

    #[test]
    fn test_returning_own_dependent_rejects_with_type_error() {
        let slot: Rc<RefCell<Option<Promise>>> = Rc::new(RefCell::new(None));
        let own = slot.clone();
        let dependent = Promise::resolve(Value::Null).then(
            move |_| Ok(own.borrow().clone().map_or(Value::Undefined, Value::Promise)),
            Err,
        );
        *slot.borrow_mut() = Some(dependent.clone());
        scheduler::run_microtasks();

        let reason = dependent.reason();
        assert_eq!(reason, Some(Value::from(Error::ChainingCycle)));
        let message = reason.as_ref().and_then(Value::as_error).map(ToString::to_string);
        assert_eq!(message.as_deref(), Some("TypeError: chaining cycle detected for promise"));
    }

    #[test]
    fn test_thenable_returned_from_handler_is_unwrapped() {
        let dependent = Promise::resolve(Value::Undefined).then(
            |_| {
                Ok(Thenable::new(|_, on_fulfilled, _| {
                    on_fulfilled.call(42);
                    Ok(())
                })
                .into_value())
            },
            Err,
        );
        scheduler::run_microtasks();
        assert_eq!(dependent.value(), Some(Value::from(42)));
    }

    #[test]
    fn test_malicious_thenable_calling_both_callbacks() {
        let dependent = Promise::resolve(Value::Undefined).then(
            |_| {
                Ok(Thenable::new(|_, on_fulfilled, on_rejected| {
                    on_fulfilled.call(1);
                    on_rejected.call(Value::error("ignored"));
                    Ok(())
                })
                .into_value())
            },
            Err,
        );
        scheduler::run_microtasks();
        assert_eq!(dependent.state(), PromiseState::Fulfilled);
        assert_eq!(dependent.value(), Some(Value::from(1)));
    }

    #[test]
    fn test_thenable_settling_later() {
        let stash: Rc<RefCell<Option<Callback>>> = Rc::new(RefCell::new(None));
        let slot = stash.clone();
        let dependent = Promise::resolve(Value::Undefined).then(
            move |_| {
                Ok(Thenable::new(move |_, _, on_rejected| {
                    *slot.borrow_mut() = Some(on_rejected);
                    Ok(())
                })
                .into_value())
            },
            Err,
        );
        scheduler::run_microtasks();
        assert!(dependent.is_pending());

        let reject = stash.borrow_mut().take();
        if let Some(reject) = reject {
            reject.call("later");
            reject.call("ignored");
        }
        assert_eq!(dependent.reason(), Some(Value::from("later")));
    }

    struct NonCallableThen;

    impl Object for NonCallableThen {
        fn then_member(&self) -> Result<Option<ThenFn>, Value> {
            Ok(None)
        }
    }

    #[test]
    fn test_object_with_non_callable_then_is_a_value() {
        let object = Value::object(NonCallableThen);
        let returned = object.clone();
        let dependent = Promise::resolve(Value::Undefined).then(move |_| Ok(returned), Err);
        scheduler::run_microtasks();
        assert_eq!(dependent.value(), Some(object));
    }

    #[test]
    fn test_all_empty_fulfills_at_once_and_reports_next_turn() {
        let (log, record) = recorder();
        let all = Promise::all(Vec::<Value>::new());
        assert_eq!(all.value(), Some(Value::from(Vec::<Value>::new())));
        all.then_with(record(), Handler::none());
        assert!(log.borrow().is_empty());
        scheduler::run_microtasks();
        assert_eq!(*log.borrow(), vec![Value::from(Vec::<Value>::new())]);
    }

    #[test]
    fn test_all_of_plain_values_is_the_input() {
        let items: Rc<[Value]> = Rc::from(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let all = Promise::all(items.clone());
        scheduler::run_microtasks();
        let value = all.value();
        let array = value.as_ref().and_then(Value::as_array);
        assert!(array.is_some_and(|array| Rc::ptr_eq(array, &items)));
    }

    #[test]
    fn test_all_of_promises() {
        let all = Promise::all(vec![
            Value::Promise(Promise::resolve(Value::from(1))),
            Value::Promise(Promise::resolve(Value::from(2))),
        ]);
        scheduler::run_microtasks();
        assert_eq!(
            all.value(),
            Some(Value::from(vec![Value::from(1), Value::from(2)]))
        );
    }

    #[test]
    fn test_all_rejects_with_first_reason() {
        let all = Promise::all(vec![
            Value::Promise(Promise::resolve(Value::from(1))),
            Value::Promise(Promise::reject(Value::from("x"))),
            Value::Promise(Promise::resolve(Value::from(2))),
        ]);
        scheduler::run_microtasks();
        assert_eq!(all.reason(), Some(Value::from("x")));
    }

    #[test]
    fn test_race() {
        let empty = Promise::race(Vec::<Value>::new());
        let raced = Promise::race(vec![
            Value::Promise(Promise::resolve(Value::from(1))),
            Value::Promise(Promise::new(|_, _| Ok(()))),
        ]);
        scheduler::run_microtasks();
        assert!(empty.is_pending());
        assert_eq!(raced.value(), Some(Value::from(1)));
    }

    #[test]
    fn test_catch_on_fulfilled_keeps_value() {
        let invoked = Rc::new(Cell::new(false));
        let flag = invoked.clone();
        let caught = Promise::resolve(Value::from("v")).catch(move |reason| {
            flag.set(true);
            Ok(reason)
        });
        scheduler::run_microtasks();
        assert!(!invoked.get());
        assert_eq!(caught.value(), Some(Value::from("v")));
    }

    #[test]
    fn test_catch_recovers() {
        let recovered = Promise::reject(Value::error("boom"))
            .then(|_| Ok(Value::from("skipped")), Err)
            .catch(|_| Ok(Value::from("recovered")));
        scheduler::run_microtasks();
        assert_eq!(recovered.value(), Some(Value::from("recovered")));
    }

    #[test]
    fn test_finally_runs_once_and_forwards_outcome() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let fulfilled = Promise::resolve(Value::from("value")).finally(move || {
            counter.set(counter.get() + 1);
            Ok(Value::from("not forwarded"))
        });
        let counter = calls.clone();
        let rejected = Promise::reject(Value::from("reason")).finally(move || {
            counter.set(counter.get() + 1);
            Ok(Value::Promise(Promise::resolve(Value::from("awaited"))))
        });
        scheduler::run_microtasks();
        assert_eq!(calls.get(), 2);
        assert_eq!(fulfilled.value(), Some(Value::from("value")));
        assert_eq!(rejected.reason(), Some(Value::from("reason")));
    }

    #[test]
    fn test_handlers_on_different_promises_run_in_scheduling_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Deferred::new();
        let b = Deferred::new();
        for (name, deferred) in [("a", &a), ("b", &b)] {
            let log = log.clone();
            deferred.promise.then(
                move |_| {
                    log.borrow_mut().push(name);
                    Ok(Value::Undefined)
                },
                Err,
            );
        }
        b.resolve.call(());
        a.resolve.call(());
        log.borrow_mut().push("sync");
        scheduler::run_microtasks();
        assert_eq!(*log.borrow(), vec!["sync", "b", "a"]);
    }

    #[test]
    fn test_long_chain_on_local_pool() {
        let mut pool = LocalPool::new();
        let tasks = Rc::new(LocalSpawnScheduler::new(pool.spawner()));
        let deferred = scheduler::with_scheduler(tasks, Deferred::new);
        let mut chain = deferred.promise.clone();
        for _ in 0..100 {
            chain = chain.then(
                |v| Ok(Value::from(v.as_number().unwrap_or(0.0) + 1.0)),
                Err,
            );
        }
        deferred.resolve.call(0);
        assert_eq!(pool.run_until(chain.waiter()), Ok(Value::from(100)));
    }

    #[test]
    fn test_awaiting_rejection_through_chain() {
        let mut pool = LocalPool::new();
        let tasks = Rc::new(LocalSpawnScheduler::new(pool.spawner()));
        let failed = scheduler::with_scheduler(tasks, || {
            Promise::resolve(Value::Undefined)
                .then(|_| Err(Value::error("handler failed")), Err)
                .finally(|| Ok(Value::Undefined))
        });
        let outcome = pool.run_until(async move { failed.await });
        assert_eq!(outcome, Err(Value::error("handler failed")));
    }
}
