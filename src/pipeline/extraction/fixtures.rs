//! Synthetic transcript documents for tests.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::dictionary;
use lopdf::{Document, Object, ObjectId, Stream, StringFormat};

use crate::models::Student;

/// A string drawn at an absolute position (PDF user space, origin bottom-left).
#[derive(Debug, Clone)]
pub struct PlacedText {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

impl PlacedText {
    pub fn new(x: f64, y: f64, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            text: text.into(),
        }
    }
}

const TOP: f64 = 740.0;
const BOTTOM: f64 = 60.0;
const LINE_STEP: f64 = 16.0;
const NAME_X: f64 = 72.0;
const FIGURE_X: f64 = 300.0;
const GRADE_X: f64 = 460.0;

/// Build a PDF with one page per entry, each string placed with `Tm`.
pub fn make_test_pdf(pages: &[Vec<PlacedText>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let contents = pages
        .iter()
        .map(|placed| {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
            ];
            for item in placed {
                operations.push(place(item.x, item.y));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::string_literal(item.text.as_str())],
                ));
            }
            operations.push(Operation::new("ET", vec![]));
            operations
        })
        .collect();

    save(doc, font_id, contents)
}

/// Glyph advance of the subset font in `make_cid_pdf`, in thousandths of an em.
pub const CID_GLYPH_WIDTH: i64 = 600;

/// Build a PDF the way report generators that subset fonts do: a Type0
/// font with Identity-H encoding, glyph IDs unrelated to the characters, a
/// ToUnicode CMap and /W widths. Every glyph is placed on its own, and
/// spaces are gaps rather than drawn glyphs.
pub fn make_cid_pdf(pages: &[Vec<PlacedText>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.6");

    let mut glyph_ids: BTreeMap<char, u16> = BTreeMap::new();
    for c in pages.iter().flatten().flat_map(|p| p.text.chars()) {
        if c != ' ' {
            let next = 3 + glyph_ids.len() as u16;
            glyph_ids.entry(c).or_insert(next);
        }
    }

    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    cmap.push_str(&format!("{} beginbfchar\n", glyph_ids.len()));
    for (c, gid) in &glyph_ids {
        cmap.push_str(&format!("<{gid:04X}> <{:04X}>\n", *c as u32));
    }
    cmap.push_str("endbfchar\nendcmap\nend\nend\n");
    let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, cmap.into_bytes()));

    let widths: Vec<Object> = glyph_ids.iter().map(|_| CID_GLYPH_WIDTH.into()).collect();
    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => "GLYPHS+TranscriptSans",
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "DW" => 1000,
        "W" => vec![Object::Integer(3), Object::Array(widths)],
    });
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => "GLYPHS+TranscriptSans",
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => to_unicode_id,
    });

    let advance = CID_GLYPH_WIDTH as f64 / 1000.0 * 10.0;
    let contents = pages
        .iter()
        .map(|placed| {
            let mut operations = vec![Operation::new("BT", vec![]), Operation::new("Tf", vec!["F1".into(), 10.into()])];
            for item in placed {
                for (i, c) in item.text.chars().enumerate() {
                    let Some(gid) = glyph_ids.get(&c) else { continue };
                    operations.push(place(item.x + i as f64 * advance, item.y));
                    operations.push(Operation::new(
                        "Tj",
                        vec![Object::String(gid.to_be_bytes().to_vec(), StringFormat::Hexadecimal)],
                    ));
                }
            }
            operations.push(Operation::new("ET", vec![]));
            operations
        })
        .collect();

    save(doc, font_id, contents)
}

fn place(x: f64, y: f64) -> Operation {
    Operation::new(
        "Tm",
        vec![
            1.into(),
            0.into(),
            0.into(),
            1.into(),
            Object::Real(x as _),
            Object::Real(y as _),
        ],
    )
}

/// One page per content, all using `font_id` as `F1`.
fn save(mut doc: Document, font_id: ObjectId, contents: Vec<Vec<Operation>>) -> Vec<u8> {
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for operations in contents {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Lay out a student's record the way a school transcript prints it:
/// a preamble, then per year a heading row with the year average, a row of
/// term GPAs and one row per course, closed by the enrollment line.
pub fn transcript_pdf(student: &Student) -> Vec<u8> {
    make_test_pdf(&transcript_pages(student))
}

/// The same layout drawn glyph by glyph in a subset Type0 font.
pub fn transcript_cid_pdf(student: &Student) -> Vec<u8> {
    make_cid_pdf(&transcript_pages(student))
}

fn transcript_pages(student: &Student) -> Vec<Vec<PlacedText>> {
    let mut pages: Vec<Vec<PlacedText>> = vec![Vec::new()];
    let mut y = TOP;

    let mut row = |cells: Vec<(f64, String)>, pages: &mut Vec<Vec<PlacedText>>| {
        if y < BOTTOM {
            pages.push(Vec::new());
            y = TOP;
        }
        if let Some(page) = pages.last_mut() {
            for (x, text) in cells {
                page.push(PlacedText::new(x, y, text));
            }
        }
        y -= LINE_STEP;
    };

    row(vec![(NAME_X, "Official Academic Transcript".into())], &mut pages);
    row(vec![(NAME_X, format!("Student: {}", student.identifier))], &mut pages);

    for year in &student.grade_years {
        let mut heading = vec![(NAME_X, format!("Grade {} {}", year.grade_level, year.year))];
        if let Some(avg) = year.year_average {
            heading.push((FIGURE_X, format!("Year Average: {avg}")));
        }
        row(heading, &mut pages);

        if !year.term_gpas.is_empty() {
            let cells = year
                .term_gpas
                .iter()
                .enumerate()
                .map(|(i, gpa)| (NAME_X + i as f64 * 130.0, format!("Term GPA: {gpa}")))
                .collect();
            row(cells, &mut pages);
        }

        for course in &year.courses {
            row(
                vec![
                    (NAME_X, course.name.clone()),
                    (GRADE_X, course.letter_grade.to_string()),
                ],
                &mut pages,
            );
        }
    }

    row(vec![(NAME_X, "Enrolled: 08/15/2019".into())], &mut pages);
    pages
}

/// Plain-text rendering of the same layout.
pub fn transcript_text(student: &Student) -> String {
    let mut out = format!("Official Academic Transcript\nStudent: {}\n", student.identifier);
    for year in &student.grade_years {
        out.push_str(&format!("Grade {} {}", year.grade_level, year.year));
        if let Some(avg) = year.year_average {
            out.push_str(&format!("    Year Average: {avg}"));
        }
        out.push('\n');
        let terms: Vec<String> = year.term_gpas.iter().map(|g| format!("Term GPA: {g}")).collect();
        if !terms.is_empty() {
            out.push_str(&terms.join("    "));
            out.push('\n');
        }
        for course in &year.courses {
            out.push_str(&format!("{}    {}\n", course.name, course.letter_grade));
        }
    }
    out.push_str("Enrolled: 08/15/2019\n");
    out
}
