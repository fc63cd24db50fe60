//! Fault report tests: section extraction, fault-list equivalence
//! resolution, and coverage computation.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use stlpress_core::fault::coverage::evaluate_formula;
use stlpress_core::fault::{FaultId, TxtFaultReport};

use crate::common::{write_file, FAULT_REPORT};

fn load_report(content: &str) -> TxtFaultReport {
    let dir = TempDir::new().expect("tempdir");
    let path = write_file(dir.path(), "report.frpt", content);
    TxtFaultReport::load(path).expect("report loads")
}

#[test]
fn extracts_brace_balanced_sections() {
    let report = load_report(FAULT_REPORT);

    let test_list = report.extract("TestList").expect("TestList");
    assert_eq!(
        test_list,
        "TestList {\n    1 test1 {Results:16020 NC:547 NO:101 NN:772 ON:14600}\n}"
    );

    let coverage = report.extract("Coverage").expect("Coverage");
    assert!(coverage.starts_with("Coverage {"));
    assert!(coverage.ends_with('}'));

    // Nested section extraction works through the depth counter.
    let groups = report.extract("StatusGroups").expect("StatusGroups");
    assert!(groups.trim_start().starts_with("StatusGroups {"));
    assert!(groups.contains("DD \"Dangerous Diagnosed\""));

    assert!(report.extract("PromotionTable").is_none());
}

#[test]
fn resolves_fault_equivalences_into_a_depth_one_forest() {
    let report = load_report(FAULT_REPORT);
    let faults = report.fault_list.as_ref().expect("fault list");

    assert_eq!(faults.len(), 9);

    // First prime absorbed one equivalent.
    let first = faults.get(FaultId(0)).expect("fault 0");
    assert!(first.is_prime());
    assert_eq!(first.equivalent_faults, 2);
    let second = faults.get(FaultId(1)).expect("fault 1");
    assert_eq!(second.equivalent_to, Some(FaultId(0)));
    assert_eq!(second.fault_status, "ON");
    assert_eq!(second.fault_type, "1");

    // Fourth prime absorbed three equivalents.
    let fourth = faults.get(FaultId(4)).expect("fault 4");
    assert!(fourth.is_prime());
    assert_eq!(fourth.equivalent_faults, 4);
    for id in [5, 6, 7] {
        assert_eq!(
            faults.get(FaultId(id)).expect("equivalent").equivalent_to,
            Some(FaultId(4))
        );
    }

    // The forest invariant holds globally.
    faults.verify_equivalences().expect("forest of depth 1");
    let prime_count = faults.primes().count();
    assert_eq!(prime_count, 5);
}

#[test]
fn parses_attributes_sites_and_groups() {
    let report = load_report(FAULT_REPORT);
    let faults = report.fault_list.as_ref().expect("fault list");

    let first = faults.get(FaultId(0)).expect("fault 0");
    assert_eq!(first.fault_sites, vec!["tb_top.dut.mult.U10.A1"]);
    assert_eq!(first.attribute("INSTR"), Some("3cb3079a"));
    assert_eq!(first.attribute("sim_time"), Some("2815ns"));

    let groups = report.status_groups.as_ref().expect("groups");
    assert_eq!(groups.len(), 5);
    assert_eq!(groups[0].0, "SA");
    assert_eq!(
        groups[3],
        (
            "DN".to_string(),
            ["PN", "ON", "PP", "OP", "NP", "AN", "AP"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        )
    );

    let formulas = report.coverage.as_ref().expect("formulas");
    assert_eq!(
        formulas[0],
        (
            "Diagnostic Coverage".to_string(),
            "DD/(NA + DA + DN + DD)".to_string()
        )
    );
}

#[test]
fn computes_all_coverage_formulas() {
    let report = load_report(FAULT_REPORT);

    // All nine faults are ON: DN = 9, DD = DA = SU = NA = 0.
    let coverage: BTreeMap<String, f64> = report
        .compute_coverage()
        .expect("coverage")
        .into_iter()
        .collect();

    assert_eq!(coverage.get("Diagnostic Coverage"), Some(&0.0));
    assert_eq!(coverage.get("Observational Coverage"), Some(&1.0));

    assert_eq!(
        report.coverage_value("Observational Coverage").expect("value"),
        1.0
    );
    assert!(report.coverage_value("No Such Formula").is_err());
}

#[test]
fn status_counts_include_equivalent_faults() {
    let report = load_report(FAULT_REPORT);
    let counts = report.status_counts().expect("counts");
    assert_eq!(counts.get("ON"), Some(&9));
}

#[test]
fn falls_back_to_per_status_ratios_without_a_coverage_section() {
    let minimal = r#"
FaultList {
    <  1> ON 1 {PORT "a"}
    <  1> NN 0 {PORT "b"}
    <  1> ON 0 {PORT "c"}
    <  1> NC 1 {PORT "d"}
}
"#;
    let report = load_report(minimal);

    let ratios: BTreeMap<String, f64> = report
        .compute_coverage()
        .expect("ratios")
        .into_iter()
        .collect();
    assert_eq!(ratios.get("ON"), Some(&0.5));
    assert_eq!(ratios.get("NN"), Some(&0.25));
    assert_eq!(ratios.get("NC"), Some(&0.25));
}

#[test]
fn coverage_formula_example() {
    // Statuses {DD:10, DN:5, NA:2, DA:3, SU:0} over the observational
    // formula give 15/20.
    let bindings: BTreeMap<String, f64> = [
        ("DD", 10.0),
        ("DN", 5.0),
        ("NA", 2.0),
        ("DA", 3.0),
        ("SU", 0.0),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), *v))
    .collect();

    let value =
        evaluate_formula("(DD + DN)/(NA + DA + DN + DD + SU)", &bindings).expect("evaluates");
    assert_eq!(value, 0.75);
}

#[test]
fn missing_fault_list_propagates() {
    let report = load_report("Coverage {\n    \"C\" = \"DD\";\n}\n");
    assert!(report.fault_list.is_none());
    assert!(report.compute_coverage().is_err());
}
