//! Shared fixtures: a tiny method-body language interpreted over dispatch.

#![allow(dead_code)]

use garnet_runtime::{Callable, Resolved, TypeId, TypeRegistry, Visibility, intern};
use garnet_vm::{CallSite, CallType, DispatchResult, Dispatcher};

/// What a method body does when run.
#[derive(Debug)]
pub enum Body {
    /// Record the tag and return.
    Tag(&'static str),
    /// Record the tag, then continue with `super` through the owned site.
    TagThenSuper(&'static str, CallSite),
    /// Call another method on `self` through the owned site.
    SendToSelf(CallSite),
}

pub fn tag(tag: &'static str) -> Body {
    Body::Tag(tag)
}

pub fn tag_then_super(tag: &'static str, name: &str) -> Body {
    Body::TagThenSuper(tag, CallSite::super_site(intern(name)))
}

pub fn send_to_self(name: &str) -> Body {
    Body::SendToSelf(CallSite::new(intern(name)))
}

pub fn define(registry: &TypeRegistry, ty: TypeId, name: &str, body: Body) {
    registry
        .define_method(ty, intern(name), Callable::new(body), Visibility::Public)
        .unwrap();
}

fn body_of(resolved: &Resolved) -> &Body {
    resolved
        .entry
        .callable()
        .and_then(|callable| callable.downcast_ref::<Body>())
        .expect("test bodies are always Body")
}

/// Execute a resolved method on a receiver of type `receiver`, returning
/// the tags recorded along the way.
pub fn run(dispatcher: &Dispatcher, receiver: TypeId, resolved: Resolved) -> DispatchResult<Vec<&'static str>> {
    let mut trace = Vec::new();
    let mut current = resolved;
    loop {
        let next = match body_of(&current) {
            Body::Tag(tag) => {
                trace.push(*tag);
                None
            }
            Body::TagThenSuper(tag, site) => {
                trace.push(*tag);
                Some(dispatcher.super_invoke(site, receiver, current.owner())?)
            }
            Body::SendToSelf(site) => Some(dispatcher.invoke(site, receiver, CallType::Functional)?),
        };
        match next {
            Some(resolved) => current = resolved,
            None => return Ok(trace),
        }
    }
}

/// `receiver.name` through `site`, executed.
pub fn call(dispatcher: &Dispatcher, site: &CallSite, receiver: TypeId) -> DispatchResult<Vec<&'static str>> {
    let resolved = dispatcher.invoke(site, receiver, CallType::Normal)?;
    run(dispatcher, receiver, resolved)
}
