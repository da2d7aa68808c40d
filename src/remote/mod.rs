pub mod mqtt_listener;
pub mod osc_listener;
