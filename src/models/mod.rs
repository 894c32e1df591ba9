//! Modelos del sistema
//!
//! Este módulo contiene los modelos de datos que viajan entre los servicios
//! y el store de identidad.

pub mod company;
pub mod credentials;
pub mod invitation;
pub mod session;
pub mod user;

pub use company::{Company, CompanyInput, ProvisionedTenant};
pub use credentials::{Password, PasswordHash};
pub use invitation::{
    Invitation, InvitationClaim, InvitationMark, InvitationScope, InvitationSnapshot, NewInvitation,
};
pub use session::Session;
pub use user::{
    AccountInput, AdminDraft, AdminInput, AuthOutcome, CollaboratorInput, NewUser,
    ResetTokenSnapshot, User, UserRole,
};
