//! [`FrameProvider`](crate::provider::FrameProvider) implementations

pub mod live;
pub mod replay;

pub use live::{LiveProvider, LiveProviderOptions};
pub use replay::{ReplayPacing, ReplayProvider};
