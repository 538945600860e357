//! Field client for logging biodiversity observations against a REST backend.
//!
//! [`ApiClient`] is the single chokepoint for backend calls and attaches the
//! bearer token held by a [`CredentialStore`]. [`SessionManager`] owns the
//! login lifecycle, and [`SubmissionFlow`] walks an observation through the
//! species details and questionnaire steps.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod fake;
pub mod location;
pub mod record;
pub mod session;
pub mod store;
pub mod util;
pub mod workflow;

pub use api::{LoginResponse, PhotoAttachment};
pub use client::{
    ApiClient, ApiRequest, ApiResponse, Body, HttpTransport, MultipartForm, RequestOptions,
    Transport,
};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use location::{EnvLocation, FixedLocation, GeoFix, LocationCapture, LocationProvider};
pub use record::{
    Answer, AnswerValue, NewSpecies, Question, QuestionKind, Session, Species, SpeciesImage,
    SpeciesLog, Stats, User,
};
pub use session::SessionManager;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, default_store_path};
pub use workflow::{
    DetailsForm, DraftObservation, FlowState, ObservationDetails, PhotoRef, SpeciesChoice,
    SubmissionFlow,
};
