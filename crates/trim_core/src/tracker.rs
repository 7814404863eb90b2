//! The state tracker: every live API object, one table per category.

use crate::error::TrackError;
use crate::handle::{Handle, ObjectCategory};
use crate::object::ObjectInfo;
use crate::packet::{Packet, PacketRecorder};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Map-of-maps from category to handle to record.
///
/// A handle lives in at most one category at a time. Iteration within a
/// category follows first-seen order, never handle value.
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    tables: HashMap<ObjectCategory, HashMap<Handle, ObjectInfo>>,
    categories: HashMap<Handle, ObjectCategory>,
    /// Image-related calls in the order the application issued them.
    image_calls: Vec<Packet>,
    next_sequence: u64,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `handle` with a default record and return it for population.
    ///
    /// Fails if the handle is already tracked, in this or any other category.
    ///
    /// # Example
    /// ```
    /// use trim_core::{Handle, ObjectCategory, StateTracker};
    ///
    /// let mut tracker = StateTracker::new();
    /// tracker.add(ObjectCategory::Instance, Handle(1)).unwrap();
    /// assert!(tracker.add(ObjectCategory::Instance, Handle(1)).is_err());
    /// ```
    pub fn add(
        &mut self,
        category: ObjectCategory,
        handle: Handle,
    ) -> Result<&mut ObjectInfo, TrackError> {
        if handle.is_null() {
            return Err(TrackError::NullHandle { category });
        }
        match self.categories.entry(handle) {
            Entry::Occupied(existing) if *existing.get() == category => {
                return Err(TrackError::AlreadyTracked { category, handle });
            }
            Entry::Occupied(existing) => {
                return Err(TrackError::CategoryConflict {
                    handle,
                    existing: *existing.get(),
                    requested: category,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(category);
            }
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        tracing::trace!(%category, %handle, "tracking object");

        let table = self.tables.entry(category).or_default();
        Ok(table
            .entry(handle)
            .or_insert_with(|| ObjectInfo::new(handle, category, sequence)))
    }

    /// Like [`add`](Self::add), but a record already present under the same
    /// category is released first. Used for APIs known to recreate handles.
    pub fn replace(
        &mut self,
        category: ObjectCategory,
        handle: Handle,
        recorder: &mut PacketRecorder,
    ) -> Result<&mut ObjectInfo, TrackError> {
        if self.category_of(handle) == Some(category) {
            tracing::warn!(%category, %handle, "replacing tracked object");
            self.remove(handle, recorder);
        }
        self.add(category, handle)
    }

    pub fn category_of(&self, handle: Handle) -> Option<ObjectCategory> {
        self.categories.get(&handle).copied()
    }

    /// `None` means the object is not tracked, which is not an error.
    pub fn get(&self, handle: Handle) -> Option<&ObjectInfo> {
        let category = self.category_of(handle)?;
        self.tables.get(&category)?.get(&handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut ObjectInfo> {
        let category = self.category_of(handle)?;
        self.tables.get_mut(&category)?.get_mut(&handle)
    }

    /// Lookup that also checks the category.
    pub fn get_in(&self, category: ObjectCategory, handle: Handle) -> Option<&ObjectInfo> {
        self.tables.get(&category)?.get(&handle)
    }

    pub fn get_in_mut(&mut self, category: ObjectCategory, handle: Handle) -> Option<&mut ObjectInfo> {
        self.tables.get_mut(&category)?.get_mut(&handle)
    }

    /// Stop tracking `handle`. Packets the record owned go to `recorder` for release,
    /// together with any ordered image calls that named it.
    pub fn remove(&mut self, handle: Handle, recorder: &mut PacketRecorder) -> Option<ObjectInfo> {
        let category = self.categories.remove(&handle)?;
        let mut info = self.tables.get_mut(&category)?.remove(&handle)?;
        recorder.release(info.take_packets());

        if category == ObjectCategory::Image {
            let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.image_calls)
                .into_iter()
                .partition(|packet| packet.touches(handle));
            self.image_calls = kept;
            recorder.release(dropped);
        }

        tracing::trace!(%category, %handle, "stopped tracking object");
        Some(info)
    }

    /// Records of one category in first-seen order.
    pub fn iter(&self, category: ObjectCategory) -> Vec<&ObjectInfo> {
        let mut objects: Vec<&ObjectInfo> = self
            .tables
            .get(&category)
            .map(|table| table.values().collect())
            .unwrap_or_default();
        objects.sort_by_key(|info| info.sequence());
        objects
    }

    /// Handles of one category in first-seen order.
    pub fn handles(&self, category: ObjectCategory) -> Vec<Handle> {
        self.iter(category).into_iter().map(ObjectInfo::handle).collect()
    }

    /// Every record, category by category in creation order.
    pub fn iter_all(&self) -> impl Iterator<Item = &ObjectInfo> + '_ {
        ObjectCategory::CREATION_ORDER
            .into_iter()
            .flat_map(move |category| self.iter(category))
    }

    pub fn count(&self, category: ObjectCategory) -> usize {
        self.tables.get(&category).map_or(0, HashMap::len)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Append an image-related call (create, memory requirements, bind) to the ordered list.
    pub fn add_image_call(&mut self, packet: Packet) {
        self.image_calls.push(packet);
    }

    pub fn image_calls(&self) -> &[Packet] {
        &self.image_calls
    }

    /// Forget everything, handing every owned packet to `recorder`.
    pub fn clear(&mut self, recorder: &mut PacketRecorder) {
        for table in self.tables.values_mut() {
            for info in table.values_mut() {
                recorder.release(info.take_packets());
            }
        }
        recorder.release(std::mem::take(&mut self.image_calls));
        self.tables.clear();
        self.categories.clear();
    }
}
