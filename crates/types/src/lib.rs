pub mod ids;
pub mod primitives;
pub mod state;
pub mod status;
pub mod validator;

pub use ids::*;
pub use primitives::*;
pub use state::*;
pub use status::*;
pub use validator::*;
