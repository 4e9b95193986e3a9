pub mod params;
pub mod schema;
pub mod settings;
pub mod steps;

pub use params::{ParamDef, Params};
pub use schema::{BrowserSection, Case, OnFailure, RetryConfig, Suite, TargetUrl, Viewport};
pub use settings::{Engine, Language, Settings};
pub use steps::{Check, DataRef, ElementRole, SendStep, Step, TextDirection};
