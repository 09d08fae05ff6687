//! Resource-state transition barriers.
//!
//! Barriers are plain descriptors; nothing happens until they are recorded
//! into a command list with [`Device::cmd_resource_barriers`].

use super::{Buffer, CommandList, Device, ResourceState, Texture};

/// A resource a barrier applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Buffer(Buffer),
    Texture(Texture),
}

impl From<Buffer> for ResourceRef {
    fn from(b: Buffer) -> Self {
        ResourceRef::Buffer(b)
    }
}

impl From<Texture> for ResourceRef {
    fn from(t: Texture) -> Self {
        ResourceRef::Texture(t)
    }
}

/// A state transition of a single resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    pub resource: ResourceRef,
    pub before: ResourceState,
    pub after: ResourceState,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceBarrier {
    Transition(Transition),
    /// Orders unordered-access writes to a resource; carries no state change.
    UnorderedAccess(ResourceRef),
}

impl ResourceBarrier {
    pub fn as_transition(&self) -> Option<&Transition> {
        match self {
            ResourceBarrier::Transition(t) => Some(t),
            ResourceBarrier::UnorderedAccess(_) => None,
        }
    }
}

/// Builds a transition barrier.
///
/// Panics if `before == after`: a no-op transition is a logic error.
pub fn transition(
    resource: impl Into<ResourceRef>,
    before: ResourceState,
    after: ResourceState,
) -> ResourceBarrier {
    assert_ne!(before, after, "transition barrier must change the resource state");
    ResourceBarrier::Transition(Transition {
        resource: resource.into(),
        before,
        after,
    })
}

/// Swaps `before` and `after` in place, producing the exit transition for an
/// entry transition.
///
/// Panics if `barrier` is not a transition barrier.
pub fn reverse(barrier: &mut ResourceBarrier) {
    match barrier {
        ResourceBarrier::Transition(t) => std::mem::swap(&mut t.before, &mut t.after),
        other => panic!("only transition barriers can be reversed, got {other:?}"),
    }
}

/// Entry transitions for one render pass, paired with their exit transitions.
///
/// [`enter`](Self::enter) records the entry barriers; [`exit`](Self::exit)
/// reverses every one of them and records the result, restoring the states the
/// resources had before the pass. A scope dropped without `exit` is a bug.
#[must_use = "a transition scope must be exited before the command list closes"]
pub struct TransitionScope {
    list: CommandList,
    barriers: Vec<ResourceBarrier>,
    exited: bool,
}

impl TransitionScope {
    pub fn enter(device: &dyn Device, list: CommandList, barriers: Vec<ResourceBarrier>) -> Self {
        debug_assert!(barriers.iter().all(|b| b.as_transition().is_some()));
        device.cmd_resource_barriers(list, &barriers);
        Self {
            list,
            barriers,
            exited: false,
        }
    }

    pub fn exit(mut self, device: &dyn Device) {
        self.barriers.iter_mut().for_each(reverse);
        device.cmd_resource_barriers(self.list, &self.barriers);
        self.exited = true;
    }
}

impl Drop for TransitionScope {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(self.exited, "transition scope dropped without reversing its barriers");
        }
    }
}
