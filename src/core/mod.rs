pub mod config;
pub mod engine_adapter;
pub mod frame_clock;
pub mod frame_slot;
pub mod image_converter;
pub mod inference_gate;
pub mod method_channel;
pub mod polling_driver;
pub mod pose_bridge;
pub mod result_channel;
pub mod statistics;

#[cfg(test)]
pub(crate) mod test_support;
