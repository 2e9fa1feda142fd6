// Domain layer: core models and ports (interfaces). No I/O beyond serde.

pub mod model;
pub mod ports;
