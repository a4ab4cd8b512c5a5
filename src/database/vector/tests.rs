use super::*;

#[test]
fn namespace_uses_bot_prefix() {
    assert_eq!(namespace_for_bot("7f3c"), "bot-7f3c");
    assert_ne!(namespace_for_bot("1"), namespace_for_bot("2"));
}

#[test]
fn metadata_serializes_camel_case() {
    let metadata = ChunkMetadata {
        text: "Line one".to_string(),
        file_path: "u/doc.pdf".to_string(),
        chunk_index: 3,
        bot_id: "9".to_string(),
        source: SOURCE_TAG.to_string(),
        chunker: "lines".to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    };

    let map = metadata.to_map();

    assert_eq!(map["filePath"], "u/doc.pdf");
    assert_eq!(map["chunkIndex"], 3);
    assert_eq!(map["botId"], "9");
    assert_eq!(map["source"], "StemBot PDF");
    assert_eq!(map["chunker"], "lines");
}
