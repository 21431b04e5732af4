// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.

/// Recruitment-analysis persona used as the system message of every call.
pub const RECRUITER_SYSTEM: &str = "You are a helpful AI assistant specialized in \
    analyzing Job Descriptions and CVs. Provide concise, direct, and actionable insights. \
    Be professional and objective.";

/// Appended to every prompt that expects a JSON object back.
pub const JSON_OBJECT_INSTRUCTION: &str = "Respond with a single valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";
