pub mod google;
pub mod mock;
pub mod sse;
pub mod traits;

pub use google::GoogleProvider;
pub use mock::MockProvider;
pub use traits::*;
