//! Dispatch under concurrent structural mutation.

mod common;

use common::{call, define, tag, tag_then_super};
use garnet_runtime::{Callable, TypeRegistry, Visibility, intern};
use garnet_vm::{CallSite, Dispatcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[test]
fn test_hundred_threads_mutate_fresh_subclasses() {
    let registry = Arc::new(TypeRegistry::new());
    let d = Dispatcher::new(registry.clone());
    let base = registry.define_class("Base", None).unwrap();
    let shared = registry.define_module("Shared");
    define(&registry, base, "foo", tag("base"));
    define(&registry, shared, "bar", tag("shared"));

    let foo = CallSite::new(intern("foo"));
    let bar = CallSite::new(intern("bar"));
    let thread_count = 100;

    let results: Vec<&str> = thread::scope(|scope| {
        let handles: Vec<_> = (0..thread_count)
            .map(|i| {
                let (registry, d, foo, bar) = (&registry, &d, &foo, &bar);
                scope.spawn(move || {
                    let sub = registry.define_class(&format!("Sub{}", i), Some(base)).unwrap();
                    let mine = registry.define_module(&format!("Mine{}", i));
                    let wrapper = registry.define_module(&format!("Wrap{}", i));

                    assert_eq!(call(d, foo, sub).unwrap(), ["base"]);
                    registry.include_module(sub, shared).unwrap();
                    define(registry, mine, "foo", tag("mine"));
                    registry.include_module(sub, mine).unwrap();
                    assert_eq!(call(d, foo, sub).unwrap(), ["mine"]);

                    define(registry, wrapper, "foo", tag_then_super("wrap", "foo"));
                    registry.prepend_module(sub, wrapper).unwrap();
                    assert_eq!(call(d, foo, sub).unwrap(), ["wrap", "mine"]);
                    assert_eq!(call(d, bar, sub).unwrap(), ["shared"]);
                    "success"
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(results, vec!["success"; thread_count]);
    assert_eq!(call(&d, &foo, base).unwrap(), ["base"]);
}

#[test]
fn test_super_sites_under_churn() {
    let registry = Arc::new(TypeRegistry::new());
    let d = Dispatcher::new(registry.clone());
    let q = registry.define_class("Q", None).unwrap();
    let y = registry.define_class("Y", Some(q)).unwrap();
    let x = registry.define_module("X");
    let a = registry.define_module("A");
    let z = registry.define_module("Z");
    let empty = registry.define_module("Empty");
    registry.include_module(x, a).unwrap();
    registry.include_modules(y, &[z, x]).unwrap();

    for name in ["foo", "bar"] {
        define(&registry, q, name, tag("Q"));
        define(&registry, a, name, tag_then_super("A", name));
        define(&registry, z, name, tag_then_super("Z", name));
    }
    let single = registry.singleton_class_of_instance(y).unwrap();

    let foo = CallSite::new(intern("foo"));
    let bar = CallSite::new(intern("bar"));
    let stop = AtomicBool::new(false);

    thread::scope(|scope| {
        // Mutations that bump generations without changing any answer.
        let churn = scope.spawn(|| {
            let mut rounds = 0u64;
            while !stop.load(Ordering::Relaxed) {
                registry
                    .define_method(q, intern("noise"), Callable::new(rounds), Visibility::Public)
                    .unwrap();
                registry.include_module(y, empty).unwrap();
                registry.alias_method(z, intern("noise_alias"), intern("foo")).unwrap();
                rounds += 1;
            }
            rounds
        });

        let workers: Vec<_> = (0..10)
            .map(|t| {
                let (d, foo, bar) = (&d, &foo, &bar);
                scope.spawn(move || {
                    for i in 0..10_000 {
                        let receiver = if (i + t) % 2 == 0 { y } else { single };
                        let site = if i % 3 == 0 { bar } else { foo };
                        assert_eq!(call(d, site, receiver).unwrap(), ["Z", "A", "Q"]);
                    }
                })
            })
            .collect();

        // Stop churning before surfacing a worker panic, or the scope never exits.
        let results: Vec<_> = workers.into_iter().map(|worker| worker.join()).collect();
        stop.store(true, Ordering::Relaxed);
        let rounds = churn.join().unwrap();
        for result in results {
            result.unwrap();
        }
        assert!(rounds > 0);
    });
}

#[test]
fn test_concurrent_redefinition_yields_some_serialization() {
    let registry = Arc::new(TypeRegistry::new());
    let d = Dispatcher::new(registry.clone());
    let a = registry.define_class("A", None).unwrap();
    let b = registry.define_class("B", Some(a)).unwrap();
    define(&registry, a, "foo", tag("first"));

    let site = CallSite::new(intern("foo"));
    let stop = AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut flip = false;
            while !stop.load(Ordering::Relaxed) {
                define(&registry, a, "foo", tag(if flip { "first" } else { "second" }));
                flip = !flip;
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let (d, site) = (&d, &site);
                scope.spawn(move || {
                    for _ in 0..5_000 {
                        let trace = call(d, site, b).unwrap();
                        assert!(trace == ["first"] || trace == ["second"]);
                    }
                })
            })
            .collect();
        let results: Vec<_> = readers.into_iter().map(|reader| reader.join()).collect();
        stop.store(true, Ordering::Relaxed);
        for result in results {
            result.unwrap();
        }
    });

    // Quiescent: the site agrees with a fresh resolution.
    let cached = d.lookup(&site, b).unwrap();
    let fresh = registry.resolve_uncached(b, intern("foo")).unwrap();
    assert!(cached.same_target(&fresh));
}
