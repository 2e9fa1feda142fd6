// Adapters layer: concrete implementations for external systems (the
// hosted model endpoint and the spreadsheet source).

pub mod gateway;
pub mod sheets;
