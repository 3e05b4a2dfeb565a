mod exporter;

pub use exporter::{render, ExportFormat, ExportItem, ExportMeta};
