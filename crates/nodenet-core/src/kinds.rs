use crate::GraphKind;

/// The graph kinds shipped with nodenet.
/// Users may define additional kinds in nodenet.toml or scenario files.
pub mod defaults {
    use super::*;

    pub fn power_hv() -> GraphKind {
        GraphKind::new("power_hv").unwrap()
    }
    pub fn power_mv() -> GraphKind {
        GraphKind::new("power_mv").unwrap()
    }
    pub fn power_lv() -> GraphKind {
        GraphKind::new("power_lv").unwrap()
    }
    pub fn pipe() -> GraphKind {
        GraphKind::new("pipe").unwrap()
    }
    pub fn device_link() -> GraphKind {
        GraphKind::new("device_link").unwrap()
    }

    pub fn all() -> Vec<GraphKind> {
        vec![power_hv(), power_mv(), power_lv(), pipe(), device_link()]
    }
}
