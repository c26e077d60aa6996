// Transcript notices shown while the portfolio context is (re)loaded.
// The transcript is reset to exactly one of these on every refresh.

pub const GREETING_NOTICE: &str = "Hello! I am your Portfolio Assistant. \
I can answer questions based on the latest resume. Please wait while I fetch the data...";

pub const LOADING_NOTICE: &str = "Fetching the latest portfolio data from the database...";

pub const LOADED_NOTICE: &str =
    "I have loaded the latest portfolio context. How can I help you?";

pub const NO_RESUME_NOTICE: &str = "Welcome! No resume has been uploaded. \
An administrator needs to log in to upload a resume to get started.";

pub const EMPTY_DOWNLOAD_MESSAGE: &str = "Downloaded resume file is empty.";

/// Transcript line for a failed refresh.
pub fn error_notice(message: &str) -> String {
    format!("Error: {message}")
}
