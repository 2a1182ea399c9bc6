use super::*;

fn person(flags: &[&str]) -> Person {
    Person {
        email: "a@b.com".to_owned(),
        user_name: "bob".to_owned(),
        flags: flags.iter().map(|f| (*f).to_owned()).collect(),
    }
}

// =============================================================
// Session defaults
// =============================================================

#[test]
fn default_session_is_logged_out() {
    let session = Session::default();
    assert!(!session.is_authenticated());
    assert!(session.flags.is_empty());
    assert!(session.error.is_empty());
}

#[test]
fn clear_resets_every_field() {
    let mut session = Session {
        token: "T1".into(),
        email: "a@b.com".into(),
        user_name: "bob".into(),
        flags: FlagSet::new(),
        error: "boom".into(),
    };
    session.flags.insert("x");
    session.clear();
    assert_eq!(session, Session::default());
}

// =============================================================
// apply_person
// =============================================================

#[test]
fn apply_person_fills_profile_and_clears_error() {
    let mut session = Session { token: "T1".into(), error: "old".into(), ..Session::default() };
    session.apply_person(person(&["x", "y"]));
    assert_eq!(session.email, "a@b.com");
    assert_eq!(session.user_name, "bob");
    assert_eq!(session.flags.as_slice(), ["x", "y"]);
    assert!(session.error.is_empty());
}

#[test]
fn apply_person_appends_without_duplicating() {
    let mut session = Session::default();
    session.flags.insert("local");
    session.apply_person(person(&["x", "local"]));
    session.apply_person(person(&["x", "local"]));
    assert_eq!(session.flags.as_slice(), ["local", "x"]);
}
