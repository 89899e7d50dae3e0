use serde::Serialize;

/// Body of the status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub last_events: Vec<EventEntry>,
    pub constantly_failing: Vec<FailingContainer>,
    pub constantly_failing_count: usize,
    pub global_status: bool,
}

impl Summary {
    pub fn new(last_events: Vec<EventEntry>, constantly_failing: Vec<FailingContainer>) -> Self {
        Self {
            last_events,
            constantly_failing_count: constantly_failing.len(),
            global_status: constantly_failing.is_empty(),
            constantly_failing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventEntry {
    pub date: String,
    pub message: String,
    pub container: String,
    pub num: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailingContainer {
    pub id: String,
    pub ident: String,
    pub restarts_in_current_frame: u64,
    pub reached_max_in_previous_frame: bool,
}

impl FailingContainer {
    pub fn new(name: &str, restarts_in_current_frame: u64, reached_max_in_previous_frame: bool) -> Self {
        Self {
            id: name.to_string(),
            ident: format!("{name}=False"),
            restarts_in_current_frame,
            reached_max_in_previous_frame,
        }
    }
}

/// Either the limit is already exceeded in this frame, or the previous frame
/// ended at the limit and the container keeps needing restarts.
pub fn is_constantly_failing(
    max_restarts_in_frame: u64,
    restarts_in_frame: u64,
    reached_max_in_previous_frame: bool,
) -> bool {
    if max_restarts_in_frame == 0 {
        return false;
    }

    restarts_in_frame > max_restarts_in_frame
        || (restarts_in_frame > 0 && reached_max_in_previous_frame)
}
