//! Plate engine: sessions, probing, and the concurrent worker pool.
mod classify;
mod export;
mod form;
mod pool;
mod probe;
mod session;
mod settings;
mod source;
mod stream;
mod worker;

pub use classify::{classify_body, status_code};
pub use export::{ensure_output_dir, write_summary, ExportError, ExportOptions, ExportPaths};
pub use form::probe_form;
pub use pool::{utc_clock, Clock, PoolConfig, PoolError, PoolHandle};
pub use probe::{
    Connector, ProbeError, ProbeFailure, Prober, ReqwestConnector, ReqwestProber,
};
pub use session::{acquire, session_token, InitError, Session};
pub use settings::{ProbeSettings, SettingsError};
pub use source::{CandidateSource, CombinationSource, LineSource, Pull, SharedSource, SourceError};
pub use stream::{EventSubscription, MsgSink};
pub use worker::{Worker, WorkerExit};
