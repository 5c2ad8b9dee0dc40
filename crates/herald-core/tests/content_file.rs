use herald_core::content::Content;
use herald_core::responder::{Reply, Responder};
use std::path::Path;

#[test]
fn sample_content_file_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/content.example.yaml");
    let content = Content::from_yaml_file(&path).expect("sample content parses");

    assert_eq!(content.faq.len(), 3);
    assert_eq!(content.menu_rows().len(), 3);
    assert_eq!(content.menu_reply("Book a Table"), None);
    assert!(content.texts.welcome.starts_with("Assalomu alaykum"));
    // Texts missing from the file keep their defaults
    assert_eq!(content.texts.registered_toast, "You are registered!");

    let responder = Responder::new(&content);
    assert!(matches!(responder.respond("Manzil qayerda?"), Some(Reply::Faq(_))));
}

#[test]
fn missing_content_file_is_an_error() {
    assert!(Content::from_yaml_file(Path::new("/nonexistent/content.yaml")).is_err());
}
