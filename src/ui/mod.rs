/// User interface module
///
/// - Detection overlay canvas and its geometry (overlay.rs)
/// - Controls, display surface and prediction list (panel.rs)

pub mod overlay;
pub mod panel;
