// Platform integrations for the native pose landmarker
pub mod pose;
