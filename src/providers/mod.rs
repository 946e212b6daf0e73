//! Provider implementations shipped with the crate. Platform bindings implement
//! [ActivityProvider](crate::activity::ActivityProvider) and
//! [NotificationProvider](crate::notification::NotificationProvider) outside of it.

pub mod memory;
