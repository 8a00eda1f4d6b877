//! Request interception for offgrid.
//!
//! Classifies requests issued by a controlled web application, answers
//! eligible ones from the current cache generation, and drives the
//! install/wait/activate lifecycle that rotates generations on deploy.

pub mod classify;
pub mod fetch;
pub mod intercept;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{InterceptionDecision, RequestClassifier};
pub use fetch::{Destination, FetchClient, FetchConfig, Fetcher, Request, Response, ResponseType};
pub use intercept::{EngineSettings, Intercepted, InterceptionEngine, Source};
pub use lifecycle::{
    ClientHandle, Clients, ControlHandle, ControlMessage, LifecycleController, LifecycleEvent, LifecycleState,
};
