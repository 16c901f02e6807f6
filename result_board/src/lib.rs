mod model;
use log::debug;

use std::collections::HashSet;

pub use crate::model::*;

// **** Private structures ****

// The program context threaded through the decode pass. The sheet declares
// it on one row (merged-cell style) and leaves it blank on the rows below,
// so it is carried forward as an explicit accumulator.
#[derive(Eq, PartialEq, Debug, Clone)]
struct ProgramContext {
    code: String,
    name: String,
    section: String,
}

// One data row after cell cleanup and header-based population, before the
// positional overrides and the context stamping.
#[derive(Debug, Clone, Default)]
struct RawRow {
    position: String,
    chest_no: String,
    candidate_name: String,
    team_code: String,
    grade: String,
    status: String,
    program_code: String,
    name: String,
    section: String,
}

impl RawRow {
    fn populate(&mut self, header: &str, value: String) {
        match header {
            "position" => self.position = value,
            "chestNo" => self.chest_no = value,
            "candidateName" => self.candidate_name = value,
            "teamCode" => self.team_code = value,
            "grade" => self.grade = value,
            "status" => self.status = value,
            "programCode" => self.program_code = value,
            "name" => self.name = value,
            "section" => self.section = value,
            _ => {}
        }
    }
}

// Normalizes a header cell to camelCase identifier form: everything
// lowercased, the character following each non-alphanumeric run uppercased.
// "Chest No" and "CHEST_NO" both become "chestNo".
fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut upper_next = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            upper_next = false;
        } else {
            upper_next = true;
        }
    }
    out
}

// Cell cleanup: whitespace trimmed first, then every quote character
// removed. The feed is not proper CSV; quotes never enclose separators.
fn clean_cell(raw: &str) -> String {
    raw.trim().replace('"', "")
}

fn cell_at(cells: &[String], idx: usize) -> String {
    cells.get(idx).cloned().unwrap_or_default()
}

/// Decodes the raw delimited feed text into the ordered record sequence.
///
/// The first line is the header; it drives the generic field population but
/// three columns are positional whatever the header calls them: index 2 is
/// the position, index 4 the grade, index 14 the status. Rows without a
/// candidate name only contribute their program declaration (if any) and are
/// never emitted. Fewer than two lines decode to an empty sequence.
///
/// Decoding is a pure function of the input text; malformed or short rows
/// are tolerated by defaulting missing cells to the empty string.
pub fn decode(raw: &str) -> Vec<ResultRecord> {
    let lines: Vec<&str> = raw.trim().split('\n').collect();
    if lines.len() < 2 {
        return Vec::new();
    }

    let headers: Vec<String> = lines[0]
        .split(',')
        .map(|h| normalize_header(&clean_cell(h)))
        .collect();
    debug!("decode: headers: {:?}", headers);

    let mut records: Vec<ResultRecord> = Vec::new();
    let mut context: Option<ProgramContext> = None;

    for line in &lines[1..] {
        let cells: Vec<String> = line.split(',').map(clean_cell).collect();

        let mut row = RawRow::default();
        for (idx, header) in headers.iter().enumerate() {
            row.populate(header, cell_at(&cells, idx));
        }

        // The sheet layout fixes these three columns by position, so they
        // win over whatever the header-based population put there.
        row.position = cell_at(&cells, 2);
        row.grade = cell_at(&cells, 4);
        row.status = cell_at(&cells, 14);

        // A row declaring a program code replaces the current context, for
        // itself and for every row below until the next declaration.
        if !row.program_code.trim().is_empty() {
            context = Some(ProgramContext {
                code: row.program_code.clone(),
                name: row.name.clone(),
                section: row.section.clone(),
            });
        }

        // Spacer and context-only rows are consumed, never emitted.
        if row.candidate_name.trim().is_empty() {
            continue;
        }

        let (program_code, program_name, program_section) = match &context {
            Some(ctx) => (ctx.code.clone(), ctx.name.clone(), ctx.section.clone()),
            None => (String::new(), String::new(), String::new()),
        };

        records.push(ResultRecord {
            position: row.position,
            chest_no: row.chest_no,
            candidate_name: row.candidate_name,
            team_code: row.team_code,
            grade: row.grade,
            status: row.status,
            program_code,
            program_name,
            program_section,
        });
    }

    debug!("decode: emitted {} records", records.len());
    records
}

/// Distinct non-empty program codes present in a record sequence.
pub fn unique_program_codes(records: &[ResultRecord]) -> HashSet<String> {
    records
        .iter()
        .filter(|r| !r.program_code.is_empty())
        .map(|r| r.program_code.clone())
        .collect()
}

// **** Grouping ****

/// Groups records by program code and orders the groups by recency in the
/// source, most recently appearing program first.
///
/// `subset` is the sequence to group (possibly filtered); `full` is the full
/// decoded sequence of the same cycle, which serves as the recency signal:
/// each group sorts by the maximum index any of its members holds in `full`.
/// Members are located by their (program code, chest number, candidate name)
/// triple rather than by identity, so independently filtered subsets order
/// the same way. A triple absent from `full` contributes -1.
///
/// Records with an empty program code are excluded from grouping. Members
/// keep input order within their group. Ties on the recency index keep
/// first-grouped order (the sort is stable).
pub fn group_programs(
    subset: &[ResultRecord],
    full: &[ResultRecord],
) -> Vec<(String, Vec<ResultRecord>)> {
    let mut groups: Vec<(String, Vec<ResultRecord>)> = Vec::new();
    for record in subset {
        if record.program_code.is_empty() {
            continue;
        }
        match groups
            .iter()
            .position(|(code, _)| *code == record.program_code)
        {
            Some(idx) => groups[idx].1.push(record.clone()),
            None => groups.push((record.program_code.clone(), vec![record.clone()])),
        }
    }

    let mut keyed: Vec<(isize, (String, Vec<ResultRecord>))> = groups
        .into_iter()
        .map(|group| (latest_source_index(&group.1, full), group))
        .collect();
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    keyed.into_iter().map(|(_, group)| group).collect()
}

fn latest_source_index(members: &[ResultRecord], full: &[ResultRecord]) -> isize {
    members
        .iter()
        .map(|m| {
            full.iter()
                .position(|r| {
                    r.program_code == m.program_code
                        && r.chest_no == m.chest_no
                        && r.candidate_name == m.candidate_name
                })
                .map(|i| i as isize)
                .unwrap_or(-1)
        })
        .max()
        .unwrap_or(-1)
}

/// Headline strings in group order, one per program: `"CODE: NAME"`.
pub fn ticker_lines(groups: &[(String, Vec<ResultRecord>)]) -> Vec<String> {
    groups
        .iter()
        .filter_map(|(code, members)| {
            members
                .first()
                .map(|first| format!("{}: {}", code, first.program_name))
        })
        .collect()
}

// **** Publication reconciliation ****

/// Unique programs in first-seen order, joined with the persisted flags.
///
/// A program with no persisted row renders unpublished; the feed's own
/// status text never affects visibility directly.
pub fn program_views(records: &[ResultRecord], flags: &[ProgramFlag]) -> Vec<ProgramView> {
    let mut views: Vec<ProgramView> = Vec::new();
    for record in records {
        if record.program_code.is_empty() {
            continue;
        }
        if views.iter().any(|v| v.code == record.program_code) {
            continue;
        }
        let flag = flags
            .iter()
            .find(|f| f.program_code == record.program_code)
            .map(|f| f.is_published);
        views.push(ProgramView {
            code: record.program_code.clone(),
            name: record.program_name.clone(),
            section: record.program_section.clone(),
            source_status: record.status.clone(),
            is_published: PublishState::from_flag(flag).is_visible(),
        });
    }
    views
}

/// Programs whose feed status asks for publication and whose persisted state
/// does not already grant it.
///
/// The plan only ever adds publications: a published program is skipped
/// whatever the feed says, so no sequence of cycles can unpublish anything
/// without an explicit operator action. Running the plan again after its
/// upserts landed yields an empty plan.
pub fn auto_publish_plan(records: &[ResultRecord], flags: &[ProgramFlag]) -> Vec<String> {
    let mut plan: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        let code = record.program_code.as_str();
        if code.is_empty() || !seen.insert(code) {
            continue;
        }
        let state = PublishState::from_flag(
            flags
                .iter()
                .find(|f| f.program_code == code)
                .map(|f| f.is_published),
        );
        if state.wants_auto_publish(&record.status) {
            plan.push(code.to_string());
        }
    }
    if !plan.is_empty() {
        debug!("auto_publish_plan: proposing {:?}", plan);
    }
    plan
}

/// Records restricted to the effectively published programs.
pub fn public_records(records: &[ResultRecord], flags: &[ProgramFlag]) -> Vec<ResultRecord> {
    let published: HashSet<&str> = flags
        .iter()
        .filter(|f| f.is_published)
        .map(|f| f.program_code.as_str())
        .collect();
    records
        .iter()
        .filter(|r| published.contains(r.program_code.as_str()))
        .cloned()
        .collect()
}

// **** Filtering ****

/// Case-insensitive containment search over candidate name, team code,
/// program name and program code. An empty term matches everything.
pub fn search(records: &[ResultRecord], term: &str) -> Vec<ResultRecord> {
    let needle = term.to_lowercase();
    records
        .iter()
        .filter(|r| {
            needle.is_empty()
                || r.candidate_name.to_lowercase().contains(&needle)
                || r.team_code.to_lowercase().contains(&needle)
                || r.program_name.to_lowercase().contains(&needle)
                || r.program_code.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

pub fn filter_by_section(records: &[ResultRecord], section: &str) -> Vec<ResultRecord> {
    records
        .iter()
        .filter(|r| r.program_section == section)
        .cloned()
        .collect()
}

pub fn filter_by_team(records: &[ResultRecord], team_code: &str) -> Vec<ResultRecord> {
    records
        .iter()
        .filter(|r| r.team_code == team_code)
        .cloned()
        .collect()
}

/// All results for one participant, matched on the chest number
/// case-insensitively.
pub fn entries_for_chest_no(records: &[ResultRecord], chest_no: &str) -> Vec<ResultRecord> {
    records
        .iter()
        .filter(|r| r.chest_no.eq_ignore_ascii_case(chest_no))
        .cloned()
        .collect()
}
