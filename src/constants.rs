// Fixed values shared by the CLI and the HTTP collaborators.

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a travel assistant that provides information on travel services available from Margie's Travel.";

pub const DEFAULT_OPENAI_API_VERSION: &str = "2024-10-21";

/// api-version used for the project's connection endpoints.
pub const CONNECTIONS_API_VERSION: &str = "2024-07-01-preview";

pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

pub const QUIT_SENTINEL: &str = "quit";
pub const INPUT_PROMPT: &str = "Enter the prompt (or type 'quit' to exit): ";
pub const EMPTY_INPUT_NOTICE: &str = "Please enter a prompt.";
