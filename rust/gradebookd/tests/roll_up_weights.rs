mod test_support;

use serde_json::json;
use test_support::{add_student, set_score, setup_school, Sidecar, YEAR};

fn create_exam(s: &mut Sidecar, tenant_id: &str, name: &str, tier: &str) -> String {
    s.id(
        "exams.create",
        json!({ "tenantId": tenant_id, "academicYear": YEAR, "name": name, "tier": tier }),
        "examId",
    )
}

fn link(s: &mut Sidecar, parent: &str, child: &str, weight: f64) {
    s.ok(
        "exams.link",
        json!({ "parentExamId": parent, "childExamId": child, "weight": weight }),
    );
}

#[test]
fn roll_up_skips_missing_scores_and_zero_weights() {
    let mut s = Sidecar::open("gradebook-rollup-weights");
    let school = setup_school(&mut s);
    let seq2 = create_exam(&mut s, &school.tenant_id, "Sequence 2", "base");
    let seq3 = create_exam(&mut s, &school.tenant_id, "Sequence 3", "base");
    let term = create_exam(&mut s, &school.tenant_id, "Term 1", "general");
    link(&mut s, &term, &school.seq1, 0.5);
    link(&mut s, &term, &seq2, 0.5);
    link(&mut s, &term, &seq3, 0.0);

    let student = add_student(&mut s, &school, "Doe");
    set_score(&mut s, &school.seq1, &school.class_id, &student, &school.math, json!(12));
    set_score(&mut s, &seq2, &school.class_id, &student, &school.math, json!(16));
    set_score(&mut s, &seq3, &school.class_id, &student, &school.math, json!(2));
    let saved = set_score(&mut s, &school.seq1, &school.class_id, &student, &school.physics, json!(8));
    assert_eq!(saved["staleParents"], json!([term.clone()]));
    set_score(&mut s, &seq2, &school.class_id, &student, &school.physics, json!("absent"));

    let rolled = s.ok("engine.rollUp", json!({ "examId": term }));
    assert_eq!(rolled["sheets"], json!(1));
    assert_eq!(rolled["records"], json!(2));

    let got = s.ok(
        "sheets.get",
        json!({ "examId": term, "classId": school.class_id, "studentId": student }),
    );
    let score_of = |cs: &str| {
        got["records"]
            .as_array()
            .expect("records")
            .iter()
            .find(|r| r["classSubjectId"] == json!(cs))
            .map(|r| r["score"].clone())
            .expect("record for subject")
    };
    // Sequence 3 carries weight 0 and the absent physics mark is not a zero.
    assert_eq!(score_of(&school.math), json!(14.0));
    assert_eq!(score_of(&school.physics), json!(8.0));
    assert_eq!(got["sheet"]["totalScore"], json!(22.0));
    assert_eq!(got["sheet"]["average"], json!(3.14));
    assert_eq!(got["sheet"]["rank"], json!(1));
}

#[test]
fn annual_rolls_up_from_general_exams() {
    let mut s = Sidecar::open("gradebook-rollup-annual");
    let school = setup_school(&mut s);
    let term = create_exam(&mut s, &school.tenant_id, "Term 1", "general");
    let annual = create_exam(&mut s, &school.tenant_id, "Annual", "annual");
    link(&mut s, &term, &school.seq1, 1.0);
    link(&mut s, &annual, &term, 1.0);

    // Linking across more than one tier is refused.
    assert_eq!(
        s.err_code(
            "exams.link",
            json!({ "parentExamId": annual, "childExamId": school.seq1, "weight": 1.0 })
        ),
        "bad_params"
    );

    let student = add_student(&mut s, &school, "Doe");
    set_score(&mut s, &school.seq1, &school.class_id, &student, &school.math, json!(17));
    s.ok("engine.rollUp", json!({ "examId": term }));
    s.ok("engine.rollUp", json!({ "examId": annual }));

    let got = s.ok(
        "sheets.get",
        json!({ "examId": annual, "classId": school.class_id, "studentId": student }),
    );
    let math = got["records"]
        .as_array()
        .expect("records")
        .iter()
        .find(|r| r["classSubjectId"] == json!(school.math))
        .cloned()
        .expect("math record");
    assert_eq!(math["score"], json!(17.0));
    assert_eq!(math["observation"], json!("Excellent"));
    assert_eq!(got["sheet"]["average"], json!(4.25));
}

#[test]
fn composite_exams_refuse_direct_entry_and_base_roll_up() {
    let mut s = Sidecar::open("gradebook-rollup-entry");
    let school = setup_school(&mut s);
    let term = create_exam(&mut s, &school.tenant_id, "Term 1", "general");
    let student = add_student(&mut s, &school, "Doe");

    let code = s.err_code(
        "scores.set",
        json!({
            "examId": term,
            "classId": school.class_id,
            "studentId": student,
            "classSubjectId": school.math,
            "value": 12
        }),
    );
    assert_eq!(code, "bad_params");
    assert_eq!(
        s.err_code("engine.rollUp", json!({ "examId": school.seq1 })),
        "bad_params"
    );
}
