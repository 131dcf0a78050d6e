pub mod linux;
pub mod srl;
pub mod vr_sros;

pub use linux::LinuxNode;
pub use srl::SrlNode;
pub use vr_sros::VrSrosNode;
