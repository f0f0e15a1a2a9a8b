mod graph;
mod module_info;


pub use graph::{EdgeKind, GraphEdge, GraphExport, GraphStatistics, ModuleGraph};
pub use module_info::{ModuleId, ModuleInfo, ModuleType};
