//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use serde_json::json;
use std::io::Write;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use docrag::app::App;
use docrag::config::Config;
use docrag::registry::ProviderSeed;
use docrag_core::models::ProviderConfig;

pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Minimal valid PDF with one line of text. The xref table carries the
/// real byte offsets so pdf-extract can parse it.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Minimal DOCX with one `<w:p>` per entry of `paragraphs`.
pub fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Ollama `/api/embed` stand-in. Each input maps to
/// `[count("invoice"), count("holiday"), 0.1]`; inputs containing
/// "poison" get a 500.
pub struct KeywordEmbeddings;

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let input = body["input"].as_str().unwrap_or_default().to_lowercase();
        if input.contains("poison") {
            return ResponseTemplate::new(500).set_body_json(json!({ "error": "model crashed" }));
        }
        let vector = vec![
            input.matches("invoice").count() as f32,
            input.matches("holiday").count() as f32,
            0.1,
        ];
        ResponseTemplate::new(200).set_body_json(json!({
            "model": EMBED_MODEL,
            "embeddings": [vector]
        }))
    }
}

pub async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": EMBED_MODEL }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .mount(&server)
        .await;
    server
}

pub fn test_config(tmp: &TempDir) -> Config {
    let db_path = tmp.path().join("docrag.sqlite");
    let config_content = format!(
        r#"
[db]
path = "{}"

[chunking]
chunk_size = 200
chunk_overlap = 20

[server]
bind = "127.0.0.1:0"
"#,
        db_path.display()
    );
    toml::from_str(&config_content).unwrap()
}

/// An app over a fresh database with an `ollama` provider pointed at
/// `server`. Returns the provider id.
pub async fn app_with_ollama(tmp: &TempDir, server: &MockServer) -> (App, String) {
    let app = App::open(&test_config(tmp)).await.unwrap();
    let views = app
        .registry
        .bootstrap(&[ProviderSeed {
            name: "ollama".to_string(),
            config: ProviderConfig::local(server.uri()),
            credential: None,
        }])
        .await
        .unwrap();
    (app, views[0].id.clone())
}

pub fn write_file(tmp: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = tmp.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
