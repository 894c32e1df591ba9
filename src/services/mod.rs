//! Servicios de negocio
//!
//! Gate de conectividad, motor de tokens con sus dos especializaciones, saga
//! de registro, autenticación y la fachada `IdentityService`.

pub mod auth_service;
pub mod collaborator_enrollment;
pub mod connectivity;
pub mod identity_service;
pub mod identity_session;
pub mod invitation_service;
pub mod notifier;
pub mod recovery_service;
pub mod registration_saga;
pub mod token_lifecycle;

pub use auth_service::AuthService;
pub use collaborator_enrollment::{CollaboratorEnrollment, EnrollmentOutcome};
pub use connectivity::{ConnectivityGate, ConnectivityStatus};
pub use identity_service::IdentityService;
pub use identity_session::IdentitySession;
pub use invitation_service::{InvitationLifecycle, InvitationRequest};
pub use notifier::{RecordingNotifier, ResetNotifier, TracingNotifier};
pub use recovery_service::{CredentialRecoveryLifecycle, NewPassword};
pub use registration_saga::{
    classify_primary_failure, PrimaryFailure, RegistrationOutcome, RegistrationPath, RegistrationSaga,
    SagaStep,
};
pub use token_lifecycle::{IssuedToken, TokenLifecycle, TokenMint, TokenVerdict, TokenWindow};
