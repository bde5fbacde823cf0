use medi_sdc::{Table, Value};
use proptest::prelude::*;

#[allow(dead_code)]
pub const COLUMNS: [&str; 6] = [
    "sex",
    "age_group",
    "marital_status",
    "education",
    "evote",
    "party",
];

#[allow(dead_code)]
pub const PUBLIC_QIS: [&str; 4] = ["sex", "age_group", "marital_status", "evote"];

#[allow(dead_code)]
pub fn load_survey() -> Table {
    let s = include_str!("../fixtures/survey.json");
    serde_json::from_str(s).expect("survey fixture parse")
}

#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub fn party_count(table: &Table, party: &str) -> usize {
    let col = table.require_column("party").expect("party column");
    table
        .value_counts(col)
        .get(&Value::text(party))
        .copied()
        .unwrap_or(0)
}

#[allow(dead_code)]
fn pick(options: &[&str], i: usize) -> Value {
    options.get(i).map(|s| Value::text(*s)).unwrap_or(Value::Missing)
}

/// Small survey tables over narrow domains, so that classes of every size
/// show up, including singletons and missing values.
#[allow(dead_code)]
pub fn arb_survey(max_rows: usize) -> impl Strategy<Value = Table> {
    let row = (0..2usize, 0..3usize, 0..2usize, 0..2usize, 0..3i64, 0..3usize);
    prop::collection::vec(row, 0..max_rows).prop_map(|rows| {
        let rows = rows
            .into_iter()
            .map(|(sex, age, ms, edu, ev, party)| {
                vec![
                    pick(&["Female", "Male"], sex),
                    pick(&["18-30", "31-50", "51+"], age),
                    pick(&["Married", "Not married"], ms),
                    pick(&["Lower education", "Higher education"], edu),
                    if ev == 2 { Value::Missing } else { Value::Code(ev) },
                    pick(&["Red", "Green"], party),
                ]
            })
            .collect();
        Table::from_rows(COLUMNS, rows).expect("generated rows match columns")
    })
}
