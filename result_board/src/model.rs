// ********* Feed data structures ***********

/// One participant's outcome in one program, as decoded from the feed.
///
/// All fields are plain strings; an absent cell decodes to the empty string.
/// The program fields are carried forward from the most recent row that
/// declared a non-empty program code, so they are filled even on rows where
/// the sheet leaves the merged cells blank.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct ResultRecord {
    /// Ordinal position, or empty for unplaced participants.
    pub position: String,
    pub chest_no: String,
    pub candidate_name: String,
    /// Short team code. See [`team_full_name`] for the display mapping.
    pub team_code: String,
    /// Optional letter grade, empty allowed.
    pub grade: String,
    /// Free-text publication hint from the feed, compared case-insensitively.
    pub status: String,
    pub program_code: String,
    pub program_name: String,
    pub program_section: String,
}

// ******** Publication structures *********

/// The reconciler's view of one persisted publication row.
///
/// The durable shape also carries an update timestamp; that is a concern of
/// the store boundary and never reaches the planning code.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ProgramFlag {
    pub program_code: String,
    pub is_published: bool,
}

/// Derived per-program summary for one fetch cycle.
///
/// Recomputed from the current record sequence and the current flag set on
/// every cycle; never persisted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ProgramView {
    pub code: String,
    pub name: String,
    pub section: String,
    /// Status text of the program's first record in decoded order.
    pub source_status: String,
    pub is_published: bool,
}

/// Publication state of a single program.
///
/// A program starts with no persisted row at all, which is distinct from an
/// explicit unpublish: auto-publication treats both as "not yet published",
/// but an operator toggle always writes a concrete row.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum PublishState {
    /// No persisted row exists for this program.
    NoOverride,
    Unpublished,
    Published,
}

impl PublishState {
    pub fn from_flag(flag: Option<bool>) -> PublishState {
        match flag {
            None => PublishState::NoOverride,
            Some(false) => PublishState::Unpublished,
            Some(true) => PublishState::Published,
        }
    }

    /// Effective visibility. Only an explicit published row makes a program
    /// visible; the feed's own status text has no direct effect.
    pub fn is_visible(&self) -> bool {
        matches!(self, PublishState::Published)
    }

    /// Whether the one-way auto-publication should propose an upsert for
    /// this program given the status text seen in the feed.
    ///
    /// Only ever proposes the transition towards published. A program that
    /// is already published is skipped, whatever the feed says.
    pub fn wants_auto_publish(&self, source_status: &str) -> bool {
        !self.is_visible() && source_status.trim().eq_ignore_ascii_case(PUBLISHED_STATUS)
    }
}

/// The feed status text that triggers auto-publication.
pub const PUBLISHED_STATUS: &str = "published";

// ******** Team lookup *********

/// Maps a short team code to its display name.
///
/// Unknown codes pass through unchanged.
pub fn team_full_name(team_code: &str) -> &str {
    match team_code {
        "AR" => "ALMARIA",
        "TD" => "TOLIDO",
        "ZR" => "ZARAGOZA",
        other => other,
    }
}
