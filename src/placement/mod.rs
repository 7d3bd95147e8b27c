pub mod selector;

pub use selector::{CapacitySelector, RandomDraw, SeededDraw, WeightedDraw, DISK_HEADROOM_MB};
