pub mod overlay_slot;
pub mod overlay_state;
