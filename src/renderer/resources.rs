//! Native resource registry
//!
//! Scene objects that own GPU-resident handles (textures, buffers, programs)
//! get one [`ResourceRef`] per rendering context, holding a fixed set of named
//! handle slots. The registry is keyed by context first, so tearing a context
//! down enumerates exactly the references created against it, whether or not
//! their owning scene objects are still alive.

use std::fmt;

use log::{debug, info};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::renderer::pass::PassKey;
use crate::renderer::surface::CanvasId;
use crate::scene::{BufferId, NodeKey, ProgramId, TextureId};

/// Native handle value; zero is the distinguished "unset" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle(pub u32);

impl NativeHandle {
    pub const UNSET: NativeHandle = NativeHandle(0);

    #[inline]
    pub fn is_set(self) -> bool {
        self != Self::UNSET
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer,
    Program,
    Framebuffer,
    DisplayList,
}

/// Identity of a scene object that owns native handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceOwner {
    Node(NodeKey),
    Texture(TextureId),
    Buffer(BufferId),
    Program(ProgramId),
    /// Per-pass objects such as the framebuffer of an image-buffer target.
    Pass(PassKey),
}

impl From<NodeKey> for ResourceOwner {
    fn from(key: NodeKey) -> Self {
        ResourceOwner::Node(key)
    }
}

impl From<TextureId> for ResourceOwner {
    fn from(id: TextureId) -> Self {
        ResourceOwner::Texture(id)
    }
}

impl From<BufferId> for ResourceOwner {
    fn from(id: BufferId) -> Self {
        ResourceOwner::Buffer(id)
    }
}

impl From<PassKey> for ResourceOwner {
    fn from(key: PassKey) -> Self {
        ResourceOwner::Pass(key)
    }
}

impl From<ProgramId> for ResourceOwner {
    fn from(id: ProgramId) -> Self {
        ResourceOwner::Program(id)
    }
}

/// Backend hook that frees a native handle.
pub trait HandleDeleter {
    fn delete_handle(&mut self, kind: ResourceKind, handle: NativeHandle);
}

/// Handle slots of one (owner, context) pair.
#[derive(Debug, Clone, Default)]
pub struct ResourceRef {
    slots: SmallVec<[(ResourceKind, NativeHandle); 4]>,
}

impl ResourceRef {
    fn new(layout: &[ResourceKind]) -> Self {
        Self {
            slots: layout.iter().map(|&k| (k, NativeHandle::UNSET)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn handle(&self, slot: usize) -> NativeHandle {
        self.slots.get(slot).map_or(NativeHandle::UNSET, |s| s.1)
    }

    /// Unsets every slot and returns the handles that were live.
    fn take_live(&mut self) -> SmallVec<[(ResourceKind, NativeHandle); 4]> {
        let mut live = SmallVec::new();
        for (kind, handle) in &mut self.slots {
            if handle.is_set() {
                live.push((*kind, *handle));
                *handle = NativeHandle::UNSET;
            }
        }
        live
    }
}

/// Context-keyed multimap of resource references.
///
/// Scene construction and context teardown may run on different threads;
/// every access is serialized through one mutex. Deleters run after the lock
/// is released.
#[derive(Default)]
pub struct ResourceRegistry {
    contexts: Mutex<FxHashMap<CanvasId, FxHashMap<ResourceOwner, ResourceRef>>>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("contexts", &self.contexts.lock().len())
            .finish()
    }
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily creates the reference for `(owner, context)`. Returns `true` if
    /// it was created by this call.
    pub fn ensure(&self, owner: ResourceOwner, context: CanvasId, layout: &[ResourceKind]) -> bool {
        let mut contexts = self.contexts.lock();
        let refs = contexts.entry(context).or_default();
        if refs.contains_key(&owner) {
            return false;
        }
        refs.insert(owner, ResourceRef::new(layout));
        true
    }

    pub fn handle(&self, owner: ResourceOwner, context: CanvasId, slot: usize) -> NativeHandle {
        self.contexts
            .lock()
            .get(&context)
            .and_then(|refs| refs.get(&owner))
            .map_or(NativeHandle::UNSET, |r| r.handle(slot))
    }

    /// Handle in `slot` of `owner`'s reference in `context`, creating the
    /// reference (with `layout`) and the handle through `create` on first use.
    pub fn get_or_create(
        &self,
        owner: ResourceOwner,
        context: CanvasId,
        layout: &[ResourceKind],
        slot: usize,
        create: impl FnOnce(ResourceKind) -> NativeHandle,
    ) -> NativeHandle {
        let mut contexts = self.contexts.lock();
        let reference = contexts
            .entry(context)
            .or_default()
            .entry(owner)
            .or_insert_with(|| ResourceRef::new(layout));

        let Some(entry) = reference.slots.get_mut(slot) else {
            return NativeHandle::UNSET;
        };
        if entry.1.is_set() {
            return entry.1;
        }
        let kind = entry.0;
        entry.1 = create(kind);
        debug!("Created {kind:?} handle {:?} for {owner:?} in context {context:?}", entry.1);
        entry.1
    }

    /// Stores a freshly created handle. Returns `false` if the reference or
    /// slot does not exist.
    pub fn set_handle(
        &self,
        owner: ResourceOwner,
        context: CanvasId,
        slot: usize,
        handle: NativeHandle,
    ) -> bool {
        let mut contexts = self.contexts.lock();
        let Some(entry) = contexts
            .get_mut(&context)
            .and_then(|refs| refs.get_mut(&owner))
            .and_then(|r| r.slots.get_mut(slot))
        else {
            return false;
        };
        entry.1 = handle;
        true
    }

    /// Destroys one slot. Unset or unknown slots are a no-op.
    pub fn destroy_slot(
        &self,
        owner: ResourceOwner,
        context: CanvasId,
        slot: usize,
        deleter: &mut dyn HandleDeleter,
    ) -> bool {
        let taken = {
            let mut contexts = self.contexts.lock();
            contexts
                .get_mut(&context)
                .and_then(|refs| refs.get_mut(&owner))
                .and_then(|r| r.slots.get_mut(slot))
                .and_then(|(kind, handle)| {
                    handle
                        .is_set()
                        .then(|| (*kind, std::mem::replace(handle, NativeHandle::UNSET)))
                })
        };

        match taken {
            Some((kind, handle)) => {
                deleter.delete_handle(kind, handle);
                true
            }
            None => false,
        }
    }

    /// Destroys every handle `owner` holds in `context` and forgets the
    /// reference. Returns the number of handles freed.
    pub fn destroy_owner(
        &self,
        owner: ResourceOwner,
        context: CanvasId,
        deleter: &mut dyn HandleDeleter,
    ) -> usize {
        let live = {
            let mut contexts = self.contexts.lock();
            contexts
                .get_mut(&context)
                .and_then(|refs| refs.remove(&owner))
                .map(|mut r| r.take_live())
                .unwrap_or_default()
        };

        for &(kind, handle) in &live {
            deleter.delete_handle(kind, handle);
        }
        live.len()
    }

    /// Destroys every handle ever registered against `context`, exactly once.
    /// Calling it again for the same context frees nothing.
    pub fn destroy_context(&self, context: CanvasId, deleter: &mut dyn HandleDeleter) -> usize {
        let Some(refs) = self.contexts.lock().remove(&context) else {
            debug!("Context {context:?} has no registered native resources");
            return 0;
        };

        let mut freed = 0;
        for (_, mut r) in refs {
            for (kind, handle) in r.take_live() {
                deleter.delete_handle(kind, handle);
                freed += 1;
            }
        }
        info!("Destroyed {freed} native handles of context {context:?}");
        freed
    }

    /// Number of set handles registered against `context`.
    pub fn live_handles(&self, context: CanvasId) -> usize {
        self.contexts.lock().get(&context).map_or(0, |refs| {
            refs.values()
                .flat_map(|r| r.slots.iter())
                .filter(|(_, h)| h.is_set())
                .count()
        })
    }
}
