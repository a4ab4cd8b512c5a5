use super::*;

fn bot(id: &str, parsed: bool) -> Bot {
    Bot {
        id: id.to_string(),
        name: "Physics".to_string(),
        user_id: None,
        file_path: "u/physics.pdf".to_string(),
        file_url: None,
        page_count: Some(3),
        file_size: None,
        first_page_text: None,
        namespace: Some("temp-namespace".to_string()),
        parsed_at: parsed.then(Utc::now),
        metadata: None,
        created_at: Utc::now(),
    }
}

#[test]
fn namespace_is_derived_from_id_not_stored_value() {
    let bot = bot("42", true);
    assert_eq!(bot.derived_namespace(), "bot-42");
}

#[test]
fn only_parsed_bots_are_searchable() {
    assert!(bot("1", true).is_searchable());
    assert!(!bot("1", false).is_searchable());
}
