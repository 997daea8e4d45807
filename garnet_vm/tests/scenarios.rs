//! End-to-end dispatch scenarios: invalidation, ordering, aliasing and
//! call-site state behavior.

mod common;

use common::{call, define, send_to_self, tag, tag_then_super};
use garnet_runtime::{Callable, TypeId, TypeRegistry, Visibility, intern};
use garnet_vm::{CallSite, CallType, DispatchConfig, DispatchError, Dispatcher, SiteStateKind};
use std::sync::Arc;

fn dispatcher() -> Dispatcher {
    Dispatcher::new(Arc::new(TypeRegistry::new()))
}

#[test]
fn test_redefinition_visible_through_empty_intermediate() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    let b = registry.define_class("B", Some(a)).unwrap();
    let c = registry.define_class("C", Some(b)).unwrap();
    define(&registry, a, "foo", tag("1"));
    define(&registry, c, "bar", send_to_self("foo"));

    let bar = CallSite::new(intern("bar"));
    assert_eq!(call(&d, &bar, c).unwrap(), ["1"]);
    assert_eq!(call(&d, &bar, c).unwrap(), ["1"]);

    define(&registry, b, "foo", tag("2"));
    assert_eq!(call(&d, &bar, c).unwrap(), ["2"]);
}

#[test]
fn test_alias_keeps_body_from_alias_time() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    define(&registry, a, "foo", tag("old"));
    registry.alias_method(a, intern("bar"), intern("foo")).unwrap();

    let foo = CallSite::new(intern("foo"));
    let bar = CallSite::new(intern("bar"));
    assert_eq!(call(&d, &bar, a).unwrap(), ["old"]);

    define(&registry, a, "foo", tag("new"));
    assert_eq!(call(&d, &foo, a).unwrap(), ["new"]);
    assert_eq!(call(&d, &bar, a).unwrap(), ["old"]);
}

#[test]
fn test_super_chain_visits_include_order() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let q = registry.define_class("Q", None).unwrap();
    let y = registry.define_class("Y", Some(q)).unwrap();
    let x = registry.define_module("X");
    let a = registry.define_module("A");
    let z = registry.define_module("Z");
    registry.include_module(x, a).unwrap();
    registry.include_modules(y, &[z, x]).unwrap();

    define(&registry, q, "foo", tag("Q"));
    define(&registry, a, "foo", tag_then_super("A", "foo"));
    define(&registry, z, "foo", tag_then_super("Z", "foo"));

    let site = CallSite::new(intern("foo"));
    for _ in 0..3 {
        assert_eq!(call(&d, &site, y).unwrap(), ["Z", "A", "Q"]);
    }
}

#[test]
fn test_prepend_into_prepended_module() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let q = registry.define_class("Q", None).unwrap();
    let a = registry.define_class("A", Some(q)).unwrap();
    let b = registry.define_module("B");
    let x = registry.define_module("X");
    define(&registry, q, "foo", tag("Q"));
    define(&registry, a, "foo", tag_then_super("A", "foo"));
    define(&registry, b, "foo", tag_then_super("B", "foo"));
    define(&registry, x, "foo", tag_then_super("X", "foo"));

    registry.prepend_module(a, b).unwrap();
    let site = CallSite::new(intern("foo"));
    assert_eq!(call(&d, &site, a).unwrap(), ["B", "A", "Q"]);

    registry.prepend_module(b, x).unwrap();
    assert_eq!(call(&d, &site, a).unwrap(), ["X", "B", "A", "Q"]);
    assert_eq!(registry.ancestors(a).unwrap()[..4], [x, b, a, q]);
}

#[test]
fn test_remove_method_signals_no_method() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    define(&registry, a, "foo", tag("A"));

    let site = CallSite::new(intern("foo"));
    assert!(call(&d, &site, a).is_ok());
    registry.remove_method(a, intern("foo")).unwrap();

    let err = call(&d, &site, a).unwrap_err();
    assert_eq!(
        err,
        DispatchError::NoMethod {
            receiver: a,
            name: intern("foo"),
            undefined: false
        }
    );
    assert!(err.is_method_missing());
}

#[test]
fn test_undef_hides_inherited_method() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    let b = registry.define_class("B", Some(a)).unwrap();
    define(&registry, a, "foo", tag("A"));

    let site = CallSite::new(intern("foo"));
    assert!(call(&d, &site, b).is_ok());
    registry.undef_method(b, intern("foo")).unwrap();

    assert!(matches!(
        call(&d, &site, b),
        Err(DispatchError::NoMethod { undefined: true, .. })
    ));
    assert_eq!(call(&d, &site, a).unwrap(), ["A"]);
}

#[test]
fn test_visibility_change_reaches_warm_site() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    let b = registry.define_class("B", Some(a)).unwrap();
    define(&registry, a, "foo", tag("A"));

    let site = CallSite::new(intern("foo"));
    assert!(call(&d, &site, b).is_ok());

    registry.set_visibility(b, intern("foo"), Visibility::Private).unwrap();
    assert!(matches!(
        d.invoke(&site, b, CallType::Normal),
        Err(DispatchError::Inaccessible {
            visibility: Visibility::Private,
            ..
        })
    ));
    assert!(d.invoke(&site, b, CallType::Variable).is_ok());
    assert!(call(&d, &site, a).is_ok());
}

#[test]
fn test_monomorphic_site_resolves_once() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    define(&registry, a, "foo", tag("A"));

    let site = CallSite::new(intern("foo"));
    for _ in 0..1_000_000 {
        d.invoke(&site, a, CallType::Normal).unwrap();
    }

    let stats = d.stats().snapshot();
    assert_eq!(stats.full_resolutions, 1);
    assert_eq!(stats.site_misses, 1);
    assert_eq!(stats.site_hits, 999_999);
    assert_eq!(site.state_kind(), SiteStateKind::Monomorphic);
}

#[test]
fn test_bimorphic_site_stays_polymorphic() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    let b = registry.define_class("B", None).unwrap();
    define(&registry, a, "foo", tag("A"));
    define(&registry, b, "foo", tag("B"));

    let site = CallSite::new(intern("foo"));
    for i in 0..1_000_000 {
        let receiver = if i % 2 == 0 { a } else { b };
        d.invoke(&site, receiver, CallType::Normal).unwrap();
    }

    let stats = d.stats().snapshot();
    assert_eq!(site.state_kind(), SiteStateKind::Polymorphic);
    assert_eq!(stats.to_megamorphic, 0);
    assert_eq!(stats.to_polymorphic, 1);
    assert_eq!(stats.full_resolutions, 2);
}

#[test]
fn test_third_receiver_type_goes_megamorphic() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let base = registry.define_class("Base", None).unwrap();
    define(&registry, base, "foo", tag("Base"));
    let receivers: Vec<TypeId> = (0..3)
        .map(|i| registry.define_class(&format!("K{}", i), Some(base)).unwrap())
        .collect();

    let site = CallSite::new(intern("foo"));
    for _ in 0..10 {
        for &receiver in &receivers {
            assert_eq!(call(&d, &site, receiver).unwrap(), ["Base"]);
        }
    }

    let stats = d.stats().snapshot();
    assert_eq!(site.state_kind(), SiteStateKind::Megamorphic);
    assert_eq!(stats.to_megamorphic, 1);
    // Megamorphic lookups are served by the shared cache.
    assert_eq!(stats.full_resolutions, 3);

    define(&registry, base, "foo", tag("Base2"));
    assert_eq!(call(&d, &site, receivers[2]).unwrap(), ["Base2"]);
    assert_eq!(site.state_kind(), SiteStateKind::Megamorphic);
}

#[test]
fn test_uncached_misses_resolve_every_time_when_megamorphic() {
    let registry = Arc::new(TypeRegistry::new());
    let d = Dispatcher::with_config(registry.clone(), DispatchConfig::uncached_misses()).unwrap();
    let a = registry.define_class("A", None).unwrap();
    let b = registry.define_class("B", None).unwrap();
    define(&registry, a, "foo", tag("A"));
    define(&registry, b, "foo", tag("B"));

    let site = CallSite::new(intern("foo"));
    for _ in 0..5 {
        assert_eq!(call(&d, &site, a).unwrap(), ["A"]);
        assert_eq!(call(&d, &site, b).unwrap(), ["B"]);
    }
    assert_eq!(site.state_kind(), SiteStateKind::Megamorphic);
    assert_eq!(d.stats().snapshot().full_resolutions, 10);
}

#[test]
fn test_reinclude_busts_site() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    let m1 = registry.define_module("M1");
    let m2 = registry.define_module("M2");
    define(&registry, m1, "foo", tag("M1"));
    define(&registry, m2, "foo", tag("M2"));
    registry.include_module(a, m1).unwrap();
    registry.include_module(a, m2).unwrap();

    let site = CallSite::new(intern("foo"));
    assert_eq!(call(&d, &site, a).unwrap(), ["M2"]);

    let before = registry.current_generation(a).unwrap();
    registry.include_module(a, m1).unwrap();
    assert!(registry.current_generation(a).unwrap() > before);

    assert_eq!(call(&d, &site, a).unwrap(), ["M2"]);
    assert_eq!(d.stats().snapshot().refreshes, 1);
}

#[test]
fn test_change_in_transitively_included_module() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let x = registry.define_module("X");
    let b = registry.define_module("B");
    let klass = registry.define_class("K", None).unwrap();
    registry.include_module(b, x).unwrap();
    registry.include_module(klass, b).unwrap();

    let site = CallSite::new(intern("foo"));
    assert!(call(&d, &site, klass).unwrap_err().is_method_missing());

    define(&registry, x, "foo", tag("X"));
    assert_eq!(call(&d, &site, klass).unwrap(), ["X"]);

    define(&registry, x, "foo", tag("X2"));
    assert_eq!(call(&d, &site, klass).unwrap(), ["X2"]);
}

#[test]
fn test_singleton_class_overrides_one_instance() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    define(&registry, a, "foo", tag("A"));
    let single = registry.singleton_class_of_instance(a).unwrap();

    let site = CallSite::new(intern("foo"));
    assert_eq!(call(&d, &site, single).unwrap(), ["A"]);
    define(&registry, single, "foo", tag_then_super("single", "foo"));
    assert_eq!(call(&d, &site, single).unwrap(), ["single", "A"]);
    assert_eq!(call(&d, &site, a).unwrap(), ["A"]);
}

#[test]
fn test_warm_site_follows_reparent() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    let c = registry.define_class("C", None).unwrap();
    let b = registry.define_class("B", Some(a)).unwrap();
    let leaf = registry.define_class("Leaf", Some(b)).unwrap();
    define(&registry, a, "foo", tag("1"));
    define(&registry, c, "foo", tag("2"));

    let site = CallSite::new(intern("foo"));
    assert_eq!(call(&d, &site, leaf).unwrap(), ["1"]);
    assert_eq!(call(&d, &site, leaf).unwrap(), ["1"]);
    assert_eq!(site.state_kind(), SiteStateKind::Monomorphic);

    registry.add_superclass(b, c).unwrap();
    assert_eq!(call(&d, &site, leaf).unwrap(), ["2"]);
    assert_eq!(d.stats().snapshot().refreshes, 1);
}

#[test]
fn test_class_methods_dispatch_through_metaclasses() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let a = registry.define_class("A", None).unwrap();
    let c = registry.define_class("C", None).unwrap();
    let b = registry.define_class("B", Some(a)).unwrap();
    let meta_a = registry.metaclass(a).unwrap();
    let meta_b = registry.metaclass(b).unwrap();
    let meta_c = registry.metaclass(c).unwrap();

    define(&registry, meta_a, "create", tag("A.create"));
    define(&registry, meta_c, "create", tag("C.create"));
    define(&registry, meta_b, "create", tag_then_super("B.create", "create"));

    // Instances do not see class methods.
    let site = CallSite::new(intern("create"));
    assert!(call(&d, &site, b).unwrap_err().is_method_missing());
    assert_eq!(call(&d, &site, meta_b).unwrap(), ["B.create", "A.create"]);

    registry.add_superclass(b, c).unwrap();
    assert_eq!(call(&d, &site, meta_b).unwrap(), ["B.create", "C.create"]);

    // Methods on `Class` reach every metaclass.
    define(&registry, TypeId::CLASS, "allocate", tag("Class#allocate"));
    let allocate = CallSite::new(intern("allocate"));
    assert_eq!(call(&d, &allocate, meta_b).unwrap(), ["Class#allocate"]);
}

/// xorshift64*, enough to shuffle operations reproducibly.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[(self.next() % items.len() as u64) as usize]
    }
}

#[test]
fn test_cached_dispatch_matches_uncached_resolution() {
    let d = dispatcher();
    let registry = d.registry().clone();
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);

    let root = registry.define_class("Root", None).unwrap();
    let mid = registry.define_class("Mid", Some(root)).unwrap();
    let leaf = registry.define_class("Leaf", Some(mid)).unwrap();
    let other = registry.define_class("Other", Some(root)).unwrap();
    let classes = [root, mid, leaf, other];
    let metaclasses: Vec<TypeId> = classes.iter().map(|&c| registry.metaclass(c).unwrap()).collect();
    let modules: Vec<TypeId> = (0..4)
        .map(|i| registry.define_module(&format!("M{}", i)))
        .collect();
    let receivers: Vec<TypeId> = classes.iter().chain(metaclasses.iter()).copied().collect();
    let all: Vec<TypeId> = receivers.iter().chain(modules.iter()).copied().collect();
    let names = [intern("a"), intern("b"), intern("c")];
    let sites: Vec<CallSite> = names.iter().map(|&name| CallSite::new(name)).collect();

    for _ in 0..2_000 {
        let ty = rng.pick(&all);
        let name = rng.pick(&names);
        // Structural errors (cycles, missing names) are expected and ignored.
        let _ = match rng.next() % 9 {
            0 | 1 => registry
                .define_method(ty, name, Callable::new(()), Visibility::Public)
                .map(drop),
            2 => registry.remove_method(ty, name).map(drop),
            3 => registry.include_module(ty, rng.pick(&modules)),
            4 => registry.prepend_module(ty, rng.pick(&modules)),
            5 => registry.alias_method(ty, name, rng.pick(&names)).map(drop),
            6 => registry.undef_method(ty, name),
            7 => registry.set_visibility(ty, name, Visibility::Private),
            _ => registry.add_superclass(rng.pick(&classes), rng.pick(&classes)),
        };

        for (&class, &meta) in classes.iter().zip(metaclasses.iter()) {
            let parent = registry.superclass(class).unwrap().unwrap();
            let parent_meta = registry.metaclass(parent).unwrap();
            assert_eq!(registry.superclass(meta).unwrap(), Some(parent_meta));
        }

        for (site, &name) in sites.iter().zip(names.iter()) {
            for &receiver in &receivers {
                let cached = d.lookup(site, receiver);
                let uncached = registry.resolve_uncached(receiver, name);
                match (cached, uncached) {
                    (Ok(cached), Ok(uncached)) => assert!(cached.same_target(&uncached)),
                    (Err(cached), Err(uncached)) => assert_eq!(cached, DispatchError::from(uncached)),
                    (cached, uncached) => panic!("cache diverged: {:?} vs {:?}", cached, uncached),
                }
            }
        }
    }
}
