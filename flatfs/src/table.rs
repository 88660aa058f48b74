use crate::node::Inode;

/// Handle for an open file, an index into the fixed descriptor table.
pub type Fd = usize;

/// Open descriptors the engine can hold at once.
pub(crate) const MAX_OPEN_FILES: usize = 20;

/// Per-descriptor state: the staged inode and the seek pointer. The inode
/// is a copy; it reaches the device again when the descriptor closes.
#[derive(Clone, Copy)]
pub(crate) struct OpenFile {
    pub inode: Inode,
    pub inumber: u32,
    pub seek: u32,
}

/// The fixed table of open files keyed by descriptor.
pub(crate) struct FileTable {
    slots: [Option<OpenFile>; MAX_OPEN_FILES],
}

impl FileTable {
    pub fn new() -> Self {
        FileTable {
            slots: [None; MAX_OPEN_FILES],
        }
    }

    /// Picks the lowest unused descriptor without reserving it.
    pub fn allocate(&self) -> Option<Fd> {
        self.slots.iter().position(|slot| slot.is_none())
    }

    /// Binds an inode to a descriptor `allocate` handed out.
    pub fn add(&mut self, inode: Inode, inumber: u32, fd: Fd) {
        debug_assert!(self.slots[fd].is_none());
        self.slots[fd] = Some(OpenFile {
            inode,
            inumber,
            seek: 0,
        });
    }

    pub fn get(&self, fd: Fd) -> Option<&OpenFile> {
        self.slots.get(fd).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut OpenFile> {
        self.slots.get_mut(fd).and_then(|slot| slot.as_mut())
    }

    /// Releases the descriptor, handing back its open-file state.
    pub fn take(&mut self, fd: Fd) -> Option<OpenFile> {
        self.slots.get_mut(fd).and_then(|slot| slot.take())
    }

    /// The descriptor a file is currently open under, if any.
    pub fn descriptor_for(&self, inumber: u32) -> Option<Fd> {
        self.slots
            .iter()
            .position(|slot| slot.map_or(false, |file| file.inumber == inumber))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors_start_at_zero_and_stay_lowest_free() {
        let mut table = FileTable::new();
        assert_eq!(table.allocate(), Some(0));
        table.add(Inode::empty(), 1, 0);
        assert_eq!(table.allocate(), Some(1));
        table.add(Inode::empty(), 2, 1);

        table.take(0);
        assert_eq!(table.allocate(), Some(0));
    }

    #[test]
    fn full_table_allocates_nothing() {
        let mut table = FileTable::new();
        for fd in 0..MAX_OPEN_FILES {
            table.add(Inode::empty(), fd as u32 + 1, fd);
        }
        assert_eq!(table.allocate(), None);
    }

    #[test]
    fn lookups_reject_unknown_descriptors() {
        let mut table = FileTable::new();
        assert!(table.get(0).is_none());
        assert!(table.get(MAX_OPEN_FILES + 5).is_none());
        assert!(table.get_mut(3).is_none());
        assert!(table.take(3).is_none());
    }

    #[test]
    fn finds_the_descriptor_holding_an_inumber() {
        let mut table = FileTable::new();
        table.add(Inode::empty(), 7, 0);
        table.add(Inode::empty(), 9, 1);

        assert_eq!(table.descriptor_for(9), Some(1));
        assert_eq!(table.descriptor_for(8), None);

        table.take(1);
        assert_eq!(table.descriptor_for(9), None);
    }

    #[test]
    fn seek_starts_at_zero() {
        let mut table = FileTable::new();
        table.add(Inode::empty(), 1, 0);
        assert_eq!(table.get(0).map(|file| file.seek), Some(0));
    }
}
