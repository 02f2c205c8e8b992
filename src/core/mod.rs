// Domain-layer modules and shared errors/models
pub mod score_resolver {
    pub use crate::score_resolver::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod context_formatter {
    pub use crate::context_formatter::*;
}

pub mod analytics {
    pub use crate::analytics::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
