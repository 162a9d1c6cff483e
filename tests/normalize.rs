use proptest::prelude::*;

use tabload::dataset::Value;
use tabload::error::NormalizeError;
use tabload::normalize::{
    NormalizeOptions, RawFile, normalize, sanitize_column_name,
};

mod common;

fn normalize_csv(bytes: &[u8]) -> Result<tabload::dataset::Dataset, NormalizeError> {
    normalize(
        &RawFile::new("input.csv", bytes.to_vec()),
        &NormalizeOptions::default(),
    )
}

#[test]
fn utf8_file_with_clean_header_round_trips() {
    let ds = normalize_csv(b"id,name,amount\n1,ada,10\n2,bob,20\n3,cyd,30\n").expect("normalize");
    assert_eq!(ds.columns, vec!["id", "name", "amount"]);
    assert_eq!(ds.row_count(), 3);
    assert_eq!(ds.rows[0][0], Value::Integer(1));
    assert_eq!(ds.rows[2][1], Value::Text("cyd".into()));
}

#[test]
fn utf8_bom_decodes_without_polluting_the_first_header() {
    let mut bytes = b"\xef\xbb\xbf".to_vec();
    bytes.extend_from_slice(b"id,name\n1,ada\n");
    let ds = normalize_csv(&bytes).expect("normalize");
    assert_eq!(ds.columns, vec!["id", "name"]);
    assert_eq!(ds.row_count(), 1);
}

#[test]
fn windows_1252_bytes_fall_through_the_encoding_ladder() {
    // "Renée,Zürich" in cp1252: 0xe9 and 0xfc are invalid UTF-8 here.
    let bytes = b"name,city\nRen\xe9e,Z\xfcrich\n".to_vec();
    let ds = normalize_csv(&bytes).expect("normalize");
    assert_eq!(ds.columns, vec!["name", "city"]);
    assert_eq!(ds.rows[0][0], Value::Text("Renée".into()));
    assert_eq!(ds.rows[0][1], Value::Text("Zürich".into()));
}

#[test]
fn leading_blank_lines_normalize_like_their_absence() {
    let with_blanks = normalize_csv(b",,\n,,\nid,name,amount\n1,ada,10\n2,bob,20\n").expect("with");
    let without = normalize_csv(b"id,name,amount\n1,ada,10\n2,bob,20\n").expect("without");
    assert_eq!(with_blanks, without);
}

#[test]
fn first_nonblank_row_wins_header_promotion() {
    // A banner row with any usable cell is the header by the heuristic; its
    // blank cells get positional placeholder names.
    let ds = normalize_csv(b"Quarterly Report 2024,,\nid,name,amount\n1,ada,10\n")
        .expect("normalize");
    assert_eq!(
        ds.columns,
        vec!["quarterly_report_2024", "unnamed_1", "unnamed_2"]
    );
    assert_eq!(ds.row_count(), 2);
}

#[test]
fn duplicate_headers_get_stable_suffixes() {
    let ds = normalize_csv(b"Name,Name,name \nada,bob,cyd\n").expect("normalize");
    assert_eq!(ds.columns, vec!["name", "name_1", "name_2"]);
}

#[test]
fn mostly_numeric_currency_column_is_recast() {
    let ds = normalize_csv(
        b"item,price\na,\"$1,200\"\nb,$3.50\nc,7\nd,8\ne,call us\n",
    )
    .expect("normalize");
    let price = ds.column_index("price").expect("price column");
    assert_eq!(ds.rows[0][price], Value::Integer(1200));
    assert_eq!(ds.rows[1][price], Value::Float(3.5));
    // The minority unparsable cell is discarded as null by design.
    assert_eq!(ds.rows[4][price], Value::Null);
}

#[test]
fn mostly_text_column_is_left_alone() {
    let ds = normalize_csv(b"code\n1\nalpha\nbeta\ngamma\ndelta\n").expect("normalize");
    assert_eq!(ds.rows[0][0], Value::Text("1".into()));
}

#[test]
fn empty_rows_and_columns_are_pruned() {
    let ds = normalize_csv(b"id,gap,name\n1,,ada\n,,\n2,,bob\n").expect("normalize");
    assert_eq!(ds.columns, vec!["id", "name"]);
    assert_eq!(ds.row_count(), 2);
}

#[test]
fn null_markers_count_as_empty() {
    let err = normalize_csv(b"a,b\nNULL,n/a\nna,N/A\n").unwrap_err();
    assert!(matches!(err, NormalizeError::EmptyDataset));
}

#[test]
fn header_only_file_is_an_empty_dataset() {
    let err = normalize_csv(b"id,name\n").unwrap_err();
    assert!(matches!(err, NormalizeError::EmptyDataset));
}

#[test]
fn all_special_header_is_a_naming_error() {
    let err = normalize_csv(b"id,$%!\n1,2\n").unwrap_err();
    assert!(matches!(err, NormalizeError::Naming(name) if name == "$%!"));
}

#[test]
fn tsv_extension_switches_the_delimiter() {
    let ds = normalize(
        &RawFile::new("data.tsv", b"id\tname\n1\tada\n".to_vec()),
        &NormalizeOptions::default(),
    )
    .expect("normalize");
    assert_eq!(ds.columns, vec!["id", "name"]);
}

#[test]
fn oversized_file_fails_before_parsing() {
    let opts = NormalizeOptions {
        max_size: 8,
        ..NormalizeOptions::default()
    };
    let err = normalize(&RawFile::new("big.csv", vec![b'a'; 100]), &opts).unwrap_err();
    assert!(matches!(err, NormalizeError::SizeLimit { size: 100, limit: 8 }));
}

#[test]
fn unsupported_extension_is_a_format_error() {
    let err = normalize(
        &RawFile::new("report.pdf", b"%PDF".to_vec()),
        &NormalizeOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, NormalizeError::Format(ext) if ext == "pdf"));
}

#[test]
fn raw_file_from_path_carries_name_and_size() {
    let ws = common::TestWorkspace::new();
    let path = ws.write("orders.csv", "id,name\n1,ada\n");
    let raw = RawFile::from_path(&path).expect("read");
    assert_eq!(raw.name, "orders.csv");
    assert_eq!(raw.size, 14);
}

proptest! {
    #[test]
    fn sanitization_is_idempotent(raw in "\\PC{0,40}") {
        let once = sanitize_column_name(&raw);
        prop_assert_eq!(sanitize_column_name(&once), once);
    }
}
