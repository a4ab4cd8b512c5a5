use super::*;
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};

fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        if !text.is_empty() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("pdf should serialize");
    buffer
}

#[test]
fn validate_rejects_empty_oversized_and_non_pdf() {
    let err = validate_pdf(b"", 100).expect_err("empty should fail");
    assert!(err.to_string().contains("empty"));

    let err = validate_pdf(b"%PDF-1.4 0123456789", 10).expect_err("oversized should fail");
    assert!(err.to_string().contains("limit"));

    let err = validate_pdf(b"<html></html>", 100).expect_err("html should fail");
    assert!(err.to_string().contains("%PDF signature"));

    assert!(validate_pdf(b"%PDF-1.7", 100).is_ok());
}

#[test]
fn extracts_pages_in_order() {
    let bytes = build_pdf(&["Kinematics basics", "Newton laws"]);

    let document = extract_pdf(&bytes).expect("extraction should succeed");

    assert_eq!(document.page_count, 2);
    let first = document.text.find("Kinematics").expect("page 1 text present");
    let second = document.text.find("Newton").expect("page 2 text present");
    assert!(first < second);
    assert!(
        document
            .first_page_text
            .as_deref()
            .is_some_and(|t| t.contains("Kinematics basics"))
    );
}

#[test]
fn blank_document_has_no_text() {
    let bytes = build_pdf(&[""]);

    let document = extract_pdf(&bytes).expect("blank pdf should still parse");

    assert_eq!(document.page_count, 1);
    assert!(document.is_blank());
    assert_eq!(document.first_page_text, None);
}

#[test]
fn corrupt_pdf_is_extraction_error() {
    let err = extract_pdf(b"%PDF-1.4\nthis is not a real pdf").expect_err("should fail");
    assert!(matches!(err, StemError::Extraction(_)));
}

#[tokio::test]
async fn extractor_validates_before_parsing() {
    let extractor = PdfTextExtractor::new(1024 * 1024);

    let err = extractor
        .extract(b"plain text".to_vec())
        .await
        .expect_err("non-pdf should fail");
    assert!(matches!(err, StemError::Extraction(_)));

    let document = extractor
        .extract(build_pdf(&["Ohm's law"]))
        .await
        .expect("pdf should extract");
    assert!(document.text.contains("Ohm's law"));
}

#[test]
fn excerpt_is_bounded_by_characters() {
    assert_eq!(excerpt("αβγδ", 2), "αβ");
    assert_eq!(excerpt("short", 10), "short");
}
