//! Normalizace cricket scoreboard snapshotů do kanonického MatchState
//! Jediná sdílená implementace — každý konzument (poll loop, score-hub)
//! bere stav odsud, žádné duplikované parsování po binárkách.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const UNKNOWN_TEAM: &str = "Unknown";

/// Surový scoreboard snapshot — nedůvěryhodný, volně typovaný JSON objekt.
/// Jakýkoliv klíč může chybět a čísla chodí klidně jako stringy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSnapshot(Map<String, Value>);

impl RawSnapshot {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Total konstrukce — ne-objekt (null, pole, string) dává prázdný snapshot.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String hodnota klíče; jiné typy se nepřetypovávají.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Celé číslo: JSON int, float (ořez k nule), nebo numerický string.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Desetinné číslo: JSON number nebo numerický string (overy typu "4.2").
    pub fn num(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

/// Pálkařský řádek jednoho striker slotu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattingLine {
    pub runs: i64,
    pub balls: i64,
}

/// Bowlerský řádek jednoho slotu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BowlingLine {
    pub overs: f64,
    pub runs: i64,
    pub wickets: i64,
}

/// Kanonický stav zápasu odvozený z jednoho snapshotu.
/// Po konstrukci imutabilní; každý tick stojí sám za sebe — žádné
/// mergování s předchozími snapshoty, žádné delta trackování.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    pub match_id: String,
    pub captured_at: i64,
    pub score_text: String,
    pub context_text: String,
    pub team_a: String,
    pub team_b: String,
    pub runs_total: u32,
    pub wicket_just_fell: bool,
    pub batsmen: BTreeMap<String, BattingLine>,
    pub bowlers: BTreeMap<String, BowlingLine>,
}

/// Odvodí MatchState z jednoho snapshotu. Total funkce — nikdy nepanikaří,
/// chybějící nebo rozbitá pole degradují na zdokumentované defaulty.
/// Žádné I/O, žádný sdílený stav; bezpečné volat z libovolného počtu tasků.
pub fn normalize(raw: &RawSnapshot, match_id: &str, captured_at: i64) -> MatchState {
    let score_text = raw.text("livescore").unwrap_or_default().to_string();
    let context_text = raw.text("update").unwrap_or_default().to_string();
    let (team_a, team_b) = extract_teams(raw.text("title").unwrap_or_default());

    let mut batsmen = BTreeMap::new();
    for (name_key, runs_key, balls_key) in [
        ("batterone", "batsmanonerun", "batsmanoneball"),
        ("battertwo", "batsmantworun", "batsmantwoball"),
    ] {
        batsmen.insert(
            raw.text(name_key).unwrap_or_default().to_string(),
            BattingLine {
                runs: raw.int(runs_key).unwrap_or(0),
                balls: raw.int(balls_key).unwrap_or(0),
            },
        );
    }

    let mut bowlers = BTreeMap::new();
    for (name_key, overs_key, runs_key, wickets_key) in [
        ("bowlerone", "bowleroneovers", "bowleronerun", "bowleronewicket"),
        ("bowlertwo", "bowlertwoovers", "bowlertworun", "bowlertwowicket"),
    ] {
        bowlers.insert(
            raw.text(name_key).unwrap_or_default().to_string(),
            BowlingLine {
                overs: raw.num(overs_key).unwrap_or(0.0),
                runs: raw.int(runs_key).unwrap_or(0),
                wickets: raw.int(wickets_key).unwrap_or(0),
            },
        );
    }

    MatchState {
        match_id: match_id.to_string(),
        captured_at,
        runs_total: parse_runs(&score_text),
        wicket_just_fell: context_text.to_lowercase().contains("wicket"),
        score_text,
        context_text,
        team_a,
        team_b,
        batsmen,
        bowlers,
    }
}

/// Názvy týmů z titulku: split na PRVNÍM výskytu "vs", z každé strany text
/// před prvním "-", trim. Bez "vs" → oba sloty "Unknown".
fn extract_teams(title: &str) -> (String, String) {
    let Some((left, right)) = title.split_once("vs") else {
        return (UNKNOWN_TEAM.to_string(), UNKNOWN_TEAM.to_string());
    };
    (team_segment(left), team_segment(right))
}

fn team_segment(segment: &str) -> String {
    let name = segment.split('-').next().unwrap_or_default().trim();
    // Prázdný segment (titulek typu "vs Australia") nesmí dát prázdný tým
    if name.is_empty() {
        UNKNOWN_TEAM.to_string()
    } else {
        name.to_string()
    }
}

/// Celkové runy ze score stringu ("250/5" → 250). Chybějící "/", prázdný
/// nebo nenumerický prefix je parse failure → 0, nikdy panic.
fn parse_runs(score_text: &str) -> u32 {
    score_text
        .split_once('/')
        .and_then(|(runs, _)| runs.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(value: Value) -> RawSnapshot {
        RawSnapshot::from_value(value)
    }

    #[test]
    fn empty_snapshot_yields_defaults() {
        let state = normalize(&RawSnapshot::new(), "m1", 1000);

        assert_eq!(state.match_id, "m1");
        assert_eq!(state.captured_at, 1000);
        assert_eq!(state.score_text, "");
        assert_eq!(state.context_text, "");
        assert_eq!(state.team_a, "Unknown");
        assert_eq!(state.team_b, "Unknown");
        assert_eq!(state.runs_total, 0);
        assert!(!state.wicket_just_fell);
        assert_eq!(state.batsmen.get(""), Some(&BattingLine::default()));
        assert_eq!(state.bowlers.get(""), Some(&BowlingLine::default()));
    }

    #[test]
    fn normalize_is_deterministic() {
        let raw = snap(json!({
            "title": "India vs Pakistan",
            "livescore": "250/5",
            "update": "Wicket falls!",
            "batterone": "Kohli",
        }));
        assert_eq!(normalize(&raw, "m1", 42), normalize(&raw, "m1", 42));
    }

    #[test]
    fn non_object_payload_is_empty_snapshot() {
        assert!(RawSnapshot::from_value(json!(null)).is_empty());
        assert!(RawSnapshot::from_value(json!([1, 2, 3])).is_empty());
        assert!(RawSnapshot::from_value(json!("nope")).is_empty());
    }

    #[test]
    fn run_count_parses_leading_component() {
        let cases = [
            ("125/3", 125),
            ("", 0),
            ("abc", 0),
            ("250", 0),     // no separator counts as a parse failure
            ("-5/3", 0),    // negative prefix never goes through
            (" 98 /2", 98), // whitespace around the prefix is tolerated
            ("/4", 0),
        ];
        for (score, expected) in cases {
            let state = normalize(&snap(json!({ "livescore": score })), "m1", 0);
            assert_eq!(state.runs_total, expected, "score_text = {score:?}");
        }
    }

    #[test]
    fn team_extraction_splits_on_first_vs() {
        let state = normalize(
            &snap(json!({ "title": "India vs Australia - 3rd ODI" })),
            "m1",
            0,
        );
        assert_eq!(state.team_a, "India");
        assert_eq!(state.team_b, "Australia");

        // Druhý "vs" zůstává součástí druhého slotu
        let state = normalize(&snap(json!({ "title": "A vs B vs C" })), "m1", 0);
        assert_eq!(state.team_a, "A");
        assert_eq!(state.team_b, "B vs C");
    }

    #[test]
    fn team_extraction_without_separator_is_unknown() {
        let state = normalize(&snap(json!({ "title": "garbled" })), "m1", 0);
        assert_eq!(state.team_a, "Unknown");
        assert_eq!(state.team_b, "Unknown");
    }

    #[test]
    fn empty_team_segment_degrades_to_unknown() {
        let state = normalize(&snap(json!({ "title": "vs Australia" })), "m1", 0);
        assert_eq!(state.team_a, "Unknown");
        assert_eq!(state.team_b, "Australia");
    }

    #[test]
    fn wicket_detection_is_case_insensitive() {
        let hit = normalize(
            &snap(json!({ "update": "OUT! Bowled, clean wicket" })),
            "m1",
            0,
        );
        assert!(hit.wicket_just_fell);

        let shout = normalize(&snap(json!({ "update": "WICKET!" })), "m1", 0);
        assert!(shout.wicket_just_fell);

        let miss = normalize(&snap(json!({ "update": "Boundary! Four runs" })), "m1", 0);
        assert!(!miss.wicket_just_fell);
    }

    #[test]
    fn player_stats_accept_numeric_strings() {
        let state = normalize(
            &snap(json!({
                "batterone": "Kohli",
                "batsmanonerun": "82",
                "batsmanoneball": 60,
                "bowlerone": "Shaheen",
                "bowleroneovers": "4.2",
                "bowleronerun": "31",
                "bowleronewicket": 2,
            })),
            "m1",
            0,
        );

        assert_eq!(state.batsmen["Kohli"], BattingLine { runs: 82, balls: 60 });
        let shaheen = &state.bowlers["Shaheen"];
        assert_eq!(shaheen.overs, 4.2);
        assert_eq!(shaheen.runs, 31);
        assert_eq!(shaheen.wickets, 2);
    }

    #[test]
    fn both_bowler_slots_are_retained() {
        let state = normalize(
            &snap(json!({
                "bowlerone": "Shaheen",
                "bowleroneovers": 4.0,
                "bowlertwo": "Rauf",
                "bowlertwoovers": 3.0,
                "bowlertworun": 22,
                "bowlertwowicket": 1,
            })),
            "m1",
            0,
        );

        assert_eq!(state.bowlers.len(), 2);
        assert_eq!(state.bowlers["Rauf"].runs, 22);
        assert_eq!(state.bowlers["Rauf"].wickets, 1);
    }

    #[test]
    fn wrongly_typed_fields_fall_back_to_defaults() {
        let state = normalize(
            &snap(json!({
                "title": 12345,
                "livescore": { "nested": true },
                "batsmanonerun": [1, 2],
                "bowleroneovers": true,
            })),
            "m1",
            0,
        );

        assert_eq!(state.team_a, "Unknown");
        assert_eq!(state.runs_total, 0);
        assert_eq!(state.batsmen[""].runs, 0);
        assert_eq!(state.bowlers[""].overs, 0.0);
    }

    #[test]
    fn full_snapshot_end_to_end() {
        let raw = snap(json!({
            "title": "India vs Pakistan",
            "livescore": "250/5",
            "update": "Wicket falls!",
            "batterone": "Kohli",
            "batsmanonerun": 82,
            "batsmanoneball": 60,
        }));
        let state = normalize(&raw, "m1", 1000);

        assert_eq!(state.match_id, "m1");
        assert_eq!(state.captured_at, 1000);
        assert_eq!(state.team_a, "India");
        assert_eq!(state.team_b, "Pakistan");
        assert_eq!(state.runs_total, 250);
        assert!(state.wicket_just_fell);
        assert_eq!(state.batsmen["Kohli"], BattingLine { runs: 82, balls: 60 });
        // Chybějící druhý pálkař → prázdný klíč s nulami (no-op-safe entry)
        assert_eq!(state.batsmen[""], BattingLine::default());
    }

    #[test]
    fn serialized_field_names_are_stable() {
        let state = normalize(&RawSnapshot::new(), "m1", 7);
        let value = serde_json::to_value(&state).expect("state serializes");
        let obj = value.as_object().expect("state is a flat object");

        for key in [
            "match_id",
            "captured_at",
            "score_text",
            "context_text",
            "team_a",
            "team_b",
            "runs_total",
            "wicket_just_fell",
            "batsmen",
            "bowlers",
        ] {
            assert!(obj.contains_key(key), "missing field {key}");
        }
    }
}
