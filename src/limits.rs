//! Hard bounds on input sizes. Checked before any mutation is attempted.

/// Forward window for recurrence expansion, in calendar months.
pub const HORIZON_MONTHS: u32 = 6;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_ITEMS_PER_KIND: usize = 10_000;
pub const MAX_SCHEDULES: usize = 100_000;
