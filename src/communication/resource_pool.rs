use std::sync::{Mutex, MutexGuard, PoisonError};

/// Something that can live in a [`ResourcePool`].
pub trait Resource: Send {
    /// Whether the resource has work pending. Only called while the
    /// resource is not reserved, so implementations must not block.
    fn is_ready(&self) -> bool {
        true
    }

    /// Releases the underlying handle. Called at most once per resource.
    fn close(&mut self);
}

/// Identifies a resource for the lifetime of its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

#[derive(Debug)]
struct Slot<R> {
    id: ResourceId,
    /// `None` while the resource is held by a reservation.
    resource: Option<R>,
}

#[derive(Debug)]
struct PoolState<R> {
    slots: Vec<Slot<R>>,
    cursor: usize,
    next_id: u64,
    closed: bool,
}

/// A set of resources handed out one at a time, round-robin, to polling
/// threads.
///
/// A reserved resource is moved out of its slot for the duration of the
/// reservation, so no two reservations can ever refer to the same resource.
#[derive(Debug)]
pub struct ResourcePool<R> {
    state: Mutex<PoolState<R>>,
}

impl<R> Default for ResourcePool<R>
where
    R: Resource,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ResourcePool<R>
where
    R: Resource,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                cursor: 0,
                next_id: 0,
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a resource, making it immediately eligible for reservation.
    ///
    /// A pool that has been closed with [`ResourcePool::close_all`] closes
    /// the resource instead of accepting it and returns `None`.
    pub fn add(&self, mut resource: R) -> Option<ResourceId> {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            resource.close();
            return None;
        }
        let id = ResourceId(state.next_id);
        state.next_id = state.next_id.wrapping_add(1);
        state.slots.push(Slot {
            id,
            resource: Some(resource),
        });
        Some(id)
    }

    /// Reserves the next ready resource after the last one handed out.
    ///
    /// Never blocks on other reservations. When no unreserved resource is
    /// ready the returned reservation is a sentinel.
    pub fn reserve_next(&self) -> Reservation<'_, R> {
        let mut state = self.lock();
        let len = state.slots.len();
        let cursor = state.cursor.min(len);
        for index in (cursor..len).chain(0..cursor) {
            let Some(slot) = state.slots.get_mut(index) else {
                continue;
            };
            let ready = slot.resource.as_ref().is_some_and(Resource::is_ready);
            if ready && let Some(resource) = slot.resource.take() {
                let id = slot.id;
                state.cursor = index.saturating_add(1);
                return Reservation {
                    pool: self,
                    held: Some((id, resource)),
                };
            }
        }
        Reservation {
            pool: self,
            held: None,
        }
    }

    /// Number of resources in the pool, reserved or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every resource and refuses further additions.
    ///
    /// Reserved resources are closed when their reservation ends.
    pub fn close_all(&self) {
        let drained: Vec<Slot<R>> = {
            let mut state = self.lock();
            state.closed = true;
            state.cursor = 0;
            state.slots.drain(..).collect()
        };
        for slot in drained {
            if let Some(mut resource) = slot.resource {
                resource.close();
            }
        }
    }

    fn release(&self, id: ResourceId, mut resource: R) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.iter_mut().find(|slot| slot.id == id) {
            slot.resource = Some(resource);
            return;
        }
        // Closed while reserved.
        drop(state);
        resource.close();
    }

    fn remove(&self, id: ResourceId) {
        let mut state = self.lock();
        if let Some(index) = state.slots.iter().position(|slot| slot.id == id) {
            state.slots.remove(index);
            if index < state.cursor {
                state.cursor = state.cursor.saturating_sub(1);
            }
        }
    }
}

/// An exclusive lease on one pooled resource, or a sentinel meaning
/// "nothing ready".
///
/// Dropping the reservation frees the resource back to the pool, so every
/// exit path of the holder releases it.
#[derive(Debug)]
pub struct Reservation<'pool, R>
where
    R: Resource,
{
    pool: &'pool ResourcePool<R>,
    held: Option<(ResourceId, R)>,
}

impl<R> Reservation<'_, R>
where
    R: Resource,
{
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.held.is_none()
    }

    #[must_use]
    pub fn id(&self) -> Option<ResourceId> {
        self.held.as_ref().map(|(id, _)| *id)
    }

    pub fn resource_mut(&mut self) -> Option<&mut R> {
        self.held.as_mut().map(|(_, resource)| resource)
    }

    /// Removes the resource from the pool permanently and closes it.
    /// Idempotent; a no-op on a sentinel.
    pub fn close(&mut self) {
        if let Some((id, mut resource)) = self.held.take() {
            self.pool.remove(id);
            resource.close();
        }
    }

    /// Returns the resource to the pool. Equivalent to dropping the
    /// reservation.
    pub fn free(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some((id, resource)) = self.held.take() {
            self.pool.release(id, resource);
        }
    }
}

impl<R> Drop for Reservation<'_, R>
where
    R: Resource,
{
    fn drop(&mut self) {
        self.release();
    }
}
