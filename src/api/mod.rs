// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod assistant_proxy {
    pub use crate::assistant_proxy::*;
}

pub mod application_limits {
    pub use crate::application_limits::*;
}
