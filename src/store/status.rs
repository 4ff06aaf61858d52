/// Record lifecycle status (spec §3). Represented as a bitfield so the
/// `BUSY_*` family can be expressed as a base status plus a busy bit,
/// matching how the source composes status constants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Status(u16);

impl Status {
    pub const EMPTY: Status = Status(0b0000_0001);
    pub const READY_CLEAN: Status = Status(0b0000_0010);
    pub const READY_NEW: Status = Status(0b0000_0100);
    pub const READY_DIRTY: Status = Status(0b0000_1000);
    pub const DESTROYED_CLEAN: Status = Status(0b0001_0000);
    pub const DESTROYED_DIRTY: Status = Status(0b0010_0000);
    pub const ERROR: Status = Status(0b0100_0000);
    const BUSY_BIT: u16 = 0b1000_0000;

    pub fn busy(base: Status) -> Status {
        Status(base.0 | Self::BUSY_BIT)
    }

    pub fn is_busy(self) -> bool {
        self.0 & Self::BUSY_BIT != 0
    }

    fn base(self) -> Status {
        Status(self.0 & !Self::BUSY_BIT)
    }

    pub fn is_dirty(self) -> bool {
        matches!(
            self.base(),
            Status::READY_DIRTY | Status::READY_NEW | Status::DESTROYED_DIRTY
        )
    }

    pub fn is_destroyed(self) -> bool {
        self.base().0 & (Status::DESTROYED_CLEAN.0 | Status::DESTROYED_DIRTY.0) != 0
    }

    pub fn is_empty(self) -> bool {
        self.base() == Status::EMPTY
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::EMPTY
    }
}
