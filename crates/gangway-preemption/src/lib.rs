//! gangway-preemption: which replica pods a gang scheduler may evict.
//!
//! One replica anchors the rendezvous that (re)forms the job's process
//! group. Evicting it forces a full job restart, so it is never marked
//! preemptible:
//!
//! - with a Coordinator role, every Coordinator pod is protected and all
//!   other pods are preemptible;
//! - without one, the rank-0 replica is protected and every other rank is
//!   preemptible.
//!
//! The decision depends only on the job's role topology and the pod's
//! (role, index), never on live state.

pub mod labeler;

pub use labeler::{PreemptionLabeler, is_preemptible};
