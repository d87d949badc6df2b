//! HTTP request handlers for the signal service.

pub mod health;
pub mod metrics;
pub mod records;
pub mod signal;
pub mod webhook;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use records::{delete_signal_records, get_signal_invitation_records, update_recording};
pub use signal::{
    get_room_by_group_id, get_rooms, get_signal_invitation_info,
    get_signal_invitation_info_start_app, get_token_by_room_id, signal_assemble,
};
pub use webhook::rtc_webhook;
