mod incident;
mod inference;

pub use incident::IncidentClient;
pub use inference::InferenceClient;
