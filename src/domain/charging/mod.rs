//! Remote start/stop result taxonomy and charge detail records
//!
//! Adapters report outcomes with these types; the session store decides
//! from them whether a session changes state.

pub mod cdr;
pub mod remote_start;
pub mod remote_stop;

pub use cdr::{ChargeDetailRecord, SendCdrResult, SendCdrResultCode};
pub use remote_start::{RemoteStartOutcome, RemoteStartResult};
pub use remote_stop::{RemoteStopOutcome, RemoteStopResult, ReservationHandling};
