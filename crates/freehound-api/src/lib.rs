//! Remote clients: the M-Team tracker API and the PushPlus notification
//! transport.
//!
//! Every operation returns an explicit `Result`; the aggregation layer
//! decides whether a failure degrades to an empty collection.

pub mod mteam;
pub mod pacer;
pub mod pushplus;
