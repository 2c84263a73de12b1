mod layout;
mod pipeline_desc;
mod pso_pool;

pub use layout::*;
pub use pipeline_desc::*;
pub use pso_pool::*;
