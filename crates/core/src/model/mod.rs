mod answer;
mod derived;
mod ids;
mod remote_settings;
mod schema;
mod session;

pub use answer::{Answer, AnswerError, AnswerKind, CodecError};
pub use derived::DerivedFields;
pub use ids::{ParseIdError, SessionId, StepKey, StepKeyError};
pub use remote_settings::{DEFAULT_TABLE, RemoteSettings, RemoteSettingsDraft, RemoteSettingsError};
pub use schema::{SchemaError, StepSchema, StepSchemaBuilder, StepSpec};
pub use session::SessionState;
