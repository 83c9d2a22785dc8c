//! `{placeholder}` substitution inside DOCX (Office Open XML) archives.
//!
//! Word splits text into runs freely, so a tag typed as `{signerName}` can
//! land on disk as `<w:t>{signer</w:t>` + `<w:t>Name}</w:t>`. Tags are
//! therefore matched on the concatenated text of each paragraph and the
//! replacement is written back into the run where the tag begins.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const BODY_PART: &str = "word/document.xml";

/// Rendered in place of a tag with no value in the data map.
pub const UNBOUND_VALUE: &str = "undefined";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Not a valid document archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive has no {BODY_PART} part")]
    MissingBody,

    #[error("Malformed XML in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("Unclosed tag in {part}: \"{fragment}\"")]
    UnclosedTag { part: String, fragment: String },

    #[error("Unopened tag in {part}: \"{fragment}\"")]
    UnopenedTag { part: String, fragment: String },

    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// Output of a render pass.
#[derive(Debug)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    /// Number of tags that were bound and replaced
    pub substitutions: usize,
}

pub struct DocxTemplate {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl DocxTemplate {
    pub fn load(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        if !archive.file_names().any(|name| name == BODY_PART) {
            return Err(TemplateError::MissingBody);
        }
        Ok(Self { archive })
    }

    /// Replace every `{tag}` and re-serialize the archive.
    ///
    /// Entries other than the text parts are copied through without
    /// recompression. Tags with no value in `data` render as
    /// [`UNBOUND_VALUE`]; newlines in values become `<w:br/>`.
    pub fn render(mut self, data: &HashMap<String, String>) -> Result<Rendered> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut substitutions = 0;

        for i in 0..self.archive.len() {
            let mut entry = self.archive.by_index(i)?;
            let name = entry.name().to_string();

            if is_text_part(&name) {
                let mut xml = String::new();
                entry.read_to_string(&mut xml)?;
                let (output, count) = substitute_part(&name, &xml, data)?;
                substitutions += count;

                let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
                writer.start_file(name, options)?;
                writer.write_all(&output)?;
            } else {
                writer.raw_copy_file(entry)?;
            }
        }

        let cursor = writer.finish()?;
        Ok(Rendered {
            bytes: cursor.into_inner(),
            substitutions,
        })
    }
}

/// Parts that carry user-visible text.
fn is_text_part(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("word/") else {
        return false;
    };
    if rest.contains('/') || !rest.ends_with(".xml") {
        return false;
    }
    rest == "document.xml"
        || rest == "footnotes.xml"
        || rest == "endnotes.xml"
        || rest.starts_with("header")
        || rest.starts_with("footer")
}

/// A `<w:t>` element: event indices of its start and end tags, the start tag
/// itself and its raw (still escaped) text.
struct TextRun<'a> {
    start: usize,
    start_tag: BytesStart<'a>,
    end: usize,
    text: String,
}

struct Rewrite<'a> {
    start_tag: BytesStart<'a>,
    end: usize,
    /// Escaped text, one entry per line. Lines are joined with `<w:br/>`.
    lines: Vec<String>,
}

fn substitute_part(
    part: &str,
    xml: &str,
    data: &HashMap<String, String>,
) -> Result<(Vec<u8>, usize)> {
    let xml_error = |e: &dyn std::fmt::Display| TemplateError::Xml {
        part: part.to_string(),
        message: e.to_string(),
    };

    let mut reader = Reader::from_str(xml);
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut paragraphs: Vec<Vec<TextRun<'_>>> = Vec::new();
    let mut open_run: Option<TextRun<'_>> = None;
    let mut rewrites: HashMap<usize, Rewrite<'_>> = HashMap::new();
    let mut substitutions = 0;

    loop {
        let event = reader.read_event().map_err(|e| xml_error(&e))?;
        let index = events.len();

        match &event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"w:p" => paragraphs.push(Vec::new()),
            Event::End(e) if e.name().as_ref() == b"w:p" => {
                if let Some(runs) = paragraphs.pop() {
                    substitutions += substitute_paragraph(part, runs, data, &mut rewrites)?;
                }
            }
            Event::Start(e) if e.name().as_ref() == b"w:t" => {
                open_run = Some(TextRun {
                    start: index,
                    start_tag: e.clone(),
                    end: index,
                    text: String::new(),
                });
            }
            Event::End(e) if e.name().as_ref() == b"w:t" => {
                if let Some(mut run) = open_run.take() {
                    run.end = index;
                    if let Some(runs) = paragraphs.last_mut() {
                        runs.push(run);
                    } else {
                        tracing::trace!("w:t outside a paragraph in {} at event {}", part, run.start);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(run) = open_run.as_mut() {
                    run.text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
            }
            Event::GeneralRef(r) => {
                if let Some(run) = open_run.as_mut() {
                    run.text.push('&');
                    run.text.push_str(&String::from_utf8_lossy(r.as_ref()));
                    run.text.push(';');
                }
            }
            _ => (),
        }

        events.push(event);
    }

    if rewrites.is_empty() {
        return Ok((xml.as_bytes().to_vec(), substitutions));
    }

    // Rewrites are keyed by the index of the w:t start event.
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(xml.len())));
    let mut skip_until: Option<usize> = None;

    for (i, event) in events.into_iter().enumerate() {
        if let Some(end) = skip_until {
            if i < end {
                continue;
            }
            skip_until = None;
        }

        match rewrites.remove(&i) {
            Some(rewrite) => {
                let start = preserve_space(&rewrite.start_tag);
                let close = start.to_end().into_owned();
                for (n, line) in rewrite.lines.into_iter().enumerate() {
                    if n > 0 {
                        writer
                            .write_event(Event::End(close.clone()))
                            .map_err(|e| xml_error(&e))?;
                        writer
                            .write_event(Event::Empty(BytesStart::new("w:br")))
                            .map_err(|e| xml_error(&e))?;
                    }
                    writer
                        .write_event(Event::Start(start.clone()))
                        .map_err(|e| xml_error(&e))?;
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(line)))
                        .map_err(|e| xml_error(&e))?;
                }
                skip_until = Some(rewrite.end);
            }
            None => writer.write_event(event).map_err(|e| xml_error(&e))?,
        }
    }

    Ok((writer.into_inner().into_inner(), substitutions))
}

/// Find tags in one paragraph and record the runs whose text changes.
fn substitute_paragraph<'a>(
    part: &str,
    runs: Vec<TextRun<'a>>,
    data: &HashMap<String, String>,
    rewrites: &mut HashMap<usize, Rewrite<'a>>,
) -> Result<usize> {
    let joined: String = runs.iter().map(|run| run.text.as_str()).collect();
    if !joined.contains('{') && !joined.contains('}') {
        return Ok(0);
    }

    let tags = find_tags(part, &joined)?;
    if tags.is_empty() {
        return Ok(0);
    }

    let mut substitutions = 0;
    let bound: Vec<(usize, usize, Vec<String>)> = tags
        .into_iter()
        .map(|(start, end)| {
            let name = joined[start + 1..end - 1].trim();
            let value = match data.get(name) {
                Some(value) => {
                    substitutions += 1;
                    value.as_str()
                }
                None => UNBOUND_VALUE,
            };
            (start, end, value_lines(value))
        })
        .collect();

    let mut offset = 0;
    for run in runs {
        let (run_start, run_end) = (offset, offset + run.text.len());
        offset = run_end;

        let mut lines = vec![String::new()];
        let mut cursor = run_start;
        for (tag_start, tag_end, value) in &bound {
            if *tag_end <= run_start || *tag_start >= run_end {
                continue;
            }
            if *tag_start >= run_start {
                push_text(&mut lines, &joined[cursor..*tag_start]);
                for (n, line) in value.iter().enumerate() {
                    if n > 0 {
                        lines.push(String::new());
                    }
                    push_text(&mut lines, line);
                }
            }
            cursor = (*tag_end).min(run_end);
        }
        if cursor < run_end {
            push_text(&mut lines, &joined[cursor..run_end]);
        }

        if lines.len() > 1 || lines[0] != run.text {
            rewrites.insert(
                run.start,
                Rewrite {
                    start_tag: run.start_tag,
                    end: run.end,
                    lines,
                },
            );
        }
    }

    Ok(substitutions)
}

fn push_text(lines: &mut [String], text: &str) {
    if let Some(last) = lines.last_mut() {
        last.push_str(text);
    }
}

/// Escaped lines of a value; `\r\n` and `\n` both break.
fn value_lines(value: &str) -> Vec<String> {
    value
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .map(|line| quick_xml::escape::escape(line).into_owned())
        .collect()
}

/// Byte ranges `[start, end)` of every `{...}` in `text`.
fn find_tags(part: &str, text: &str) -> Result<Vec<(usize, usize)>> {
    let mut tags = Vec::new();
    let mut open: Option<usize> = None;

    for (pos, ch) in text.char_indices() {
        match ch {
            '{' => {
                if let Some(start) = open {
                    return Err(TemplateError::UnclosedTag {
                        part: part.to_string(),
                        fragment: text[start..pos].to_string(),
                    });
                }
                open = Some(pos);
            }
            '}' => match open.take() {
                Some(start) => tags.push((start, pos + 1)),
                None => {
                    return Err(TemplateError::UnopenedTag {
                        part: part.to_string(),
                        fragment: text[..=pos].to_string(),
                    });
                }
            },
            _ => (),
        }
    }

    if let Some(start) = open {
        return Err(TemplateError::UnclosedTag {
            part: part.to_string(),
            fragment: text[start..].to_string(),
        });
    }

    Ok(tags)
}

fn preserve_space(start: &BytesStart<'_>) -> BytesStart<'static> {
    let mut owned = start.clone().into_owned();
    let has_space = owned
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"xml:space");
    if !has_space {
        owned.push_attribute(("xml:space", "preserve"));
    }
    owned
}

#[cfg(test)]
mod tests {
    use super::*;

    const W_NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;

    fn build_docx(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in parts {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn body(paragraphs: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W_NS}><w:body>{paragraphs}</w:body></w:document>"#
        )
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    fn signer(name: &str) -> HashMap<String, String> {
        HashMap::from([("signerName".to_string(), name.to_string())])
    }

    fn render(parts: &[(&str, &str)], data: &HashMap<String, String>) -> Result<Rendered> {
        DocxTemplate::load(build_docx(parts))?.render(data)
    }

    #[test]
    fn test_substitutes_single_run() {
        let document = body("<w:p><w:r><w:t>Signed by: {signerName}</w:t></w:r></w:p>");
        let rendered = render(&[("word/document.xml", &document)], &signer("Dana Levi")).unwrap();

        assert_eq!(rendered.substitutions, 1);
        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert!(xml.contains("Signed by: Dana Levi"));
        assert!(!xml.contains("{signerName}"));
        assert!(xml.contains(r#"xml:space="preserve""#));
    }

    #[test]
    fn test_substitutes_tag_split_across_runs() {
        let document = body(
            "<w:p><w:r><w:t>Name: {sig</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>nerName</w:t></w:r><w:r><w:t>} (signed)</w:t></w:r></w:p>",
        );
        let rendered = render(&[("word/document.xml", &document)], &signer("Dana Levi")).unwrap();

        assert_eq!(rendered.substitutions, 1);
        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert!(xml.contains(">Name: Dana Levi</w:t>"));
        assert!(xml.contains(r#"<w:t xml:space="preserve"></w:t>"#));
        assert!(xml.contains(r#"<w:t xml:space="preserve"> (signed)</w:t>"#));
        assert!(xml.contains("<w:b/>"));
    }

    #[test]
    fn test_escapes_values() {
        let document = body("<w:p><w:r><w:t>{signerName}</w:t></w:r></w:p>");
        let rendered = render(&[("word/document.xml", &document)], &signer("Tom & <Jerry>")).unwrap();

        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert!(xml.contains("Tom &amp; &lt;Jerry&gt;"));
    }

    #[test]
    fn test_newlines_become_breaks() {
        let document = body("<w:p><w:r><w:t>By {signerName}</w:t></w:r></w:p>");
        let rendered = render(&[("word/document.xml", &document)], &signer("Dana\nLevi")).unwrap();

        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert!(xml.contains(
            r#"<w:t xml:space="preserve">By Dana</w:t><w:br/><w:t xml:space="preserve">Levi</w:t>"#
        ));
        assert!(!xml.contains('\n'));
    }

    #[test]
    fn test_crlf_in_value_is_one_break() {
        let document = body("<w:p><w:r><w:t>{signerName}</w:t></w:r></w:p>");
        let rendered = render(&[("word/document.xml", &document)], &signer("A\r\nB")).unwrap();

        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert_eq!(xml.matches("<w:br/>").count(), 1);
        assert!(!xml.contains('\r'));
    }

    #[test]
    fn test_keeps_entities_around_tags() {
        let document = body("<w:p><w:r><w:t>R&amp;D: {signerName}</w:t></w:r></w:p>");
        let rendered = render(&[("word/document.xml", &document)], &signer("Noa")).unwrap();

        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert!(xml.contains("R&amp;D: Noa"));
    }

    #[test]
    fn test_unbound_tags_render_as_undefined() {
        let document = body("<w:p><w:r><w:t>{date} / {signerName}</w:t></w:r></w:p>");
        let rendered = render(&[("word/document.xml", &document)], &signer("Noa")).unwrap();

        assert_eq!(rendered.substitutions, 1);
        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert!(xml.contains("undefined / Noa"));
        assert!(!xml.contains("{date}"));
    }

    #[test]
    fn test_second_render_is_a_no_op() {
        let document = body("<w:p><w:r><w:t>By {signerName}</w:t></w:r></w:p>");
        let first = render(&[("word/document.xml", &document)], &signer("First")).unwrap();
        let second = DocxTemplate::load(first.bytes)
            .unwrap()
            .render(&signer("Second"))
            .unwrap();

        assert_eq!(second.substitutions, 0);
        let xml = read_part(&second.bytes, "word/document.xml");
        assert!(xml.contains("By First"));
        assert!(!xml.contains("Second"));
    }

    #[test]
    fn test_headers_and_footers_are_rendered() {
        let document = body("<w:p><w:r><w:t>Body</w:t></w:r></w:p>");
        let header = format!(r#"<w:hdr {W_NS}><w:p><w:r><w:t>Header {{signerName}}</w:t></w:r></w:p></w:hdr>"#);
        let footer = format!(r#"<w:ftr {W_NS}><w:p><w:r><w:t>Footer {{signerName}}</w:t></w:r></w:p></w:ftr>"#);
        let styles = "<w:styles/>";

        let rendered = render(
            &[
                ("word/document.xml", &document),
                ("word/header1.xml", &header),
                ("word/footer2.xml", &footer),
                ("word/styles.xml", styles),
            ],
            &signer("Dana"),
        )
        .unwrap();

        assert_eq!(rendered.substitutions, 2);
        assert!(read_part(&rendered.bytes, "word/header1.xml").contains("Header Dana"));
        assert!(read_part(&rendered.bytes, "word/footer2.xml").contains("Footer Dana"));
        assert_eq!(read_part(&rendered.bytes, "word/styles.xml"), styles);
    }

    #[test]
    fn test_nested_paragraphs_are_independent() {
        let document = body(
            "<w:p><w:r><w:t>Outer {signer</w:t></w:r><w:r><w:txbxContent><w:p><w:r><w:t>Inner {signerName}</w:t></w:r></w:p></w:txbxContent></w:r><w:r><w:t>Name}</w:t></w:r></w:p>",
        );
        let rendered = render(&[("word/document.xml", &document)], &signer("X")).unwrap();

        assert_eq!(rendered.substitutions, 2);
        let xml = read_part(&rendered.bytes, "word/document.xml");
        assert!(xml.contains("Inner X"));
        assert!(xml.contains("Outer X"));
    }

    #[test]
    fn test_unclosed_tag_is_an_error() {
        let document = body("<w:p><w:r><w:t>Broken {signerName</w:t></w:r></w:p>");
        let result = render(&[("word/document.xml", &document)], &signer("X"));
        assert!(matches!(result, Err(TemplateError::UnclosedTag { .. })));
    }

    #[test]
    fn test_unopened_tag_is_an_error() {
        let document = body("<w:p><w:r><w:t>Broken signerName}</w:t></w:r></w:p>");
        let result = render(&[("word/document.xml", &document)], &signer("X"));
        assert!(matches!(result, Err(TemplateError::UnopenedTag { .. })));
    }

    #[test]
    fn test_rejects_non_archives() {
        let result = DocxTemplate::load(b"plain text, not a zip".to_vec());
        assert!(matches!(result, Err(TemplateError::Archive(_))));
    }

    #[test]
    fn test_rejects_archive_without_body() {
        let bytes = build_docx(&[("readme.txt", "hello")]);
        assert!(matches!(
            DocxTemplate::load(bytes),
            Err(TemplateError::MissingBody)
        ));
    }

    #[test]
    fn test_is_text_part() {
        assert!(is_text_part("word/document.xml"));
        assert!(is_text_part("word/header3.xml"));
        assert!(is_text_part("word/footnotes.xml"));
        assert!(!is_text_part("word/styles.xml"));
        assert!(!is_text_part("word/_rels/document.xml.rels"));
        assert!(!is_text_part("docProps/core.xml"));
    }
}
