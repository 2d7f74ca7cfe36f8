use criterion::{black_box, criterion_group, criterion_main, Criterion};
use edgarx::{parse_index, Cik, Parser};
use std::io::Cursor;

const HEADER: &str = "\
Description:           Master Index of EDGAR Dissemination Feed by Form Type
Last Data Received:    September 30, 2023
Comments:              webmaster@sec.gov
Anonymous FTP:         ftp://ftp.sec.gov/edgar/
Cloud HTTP:            https://www.sec.gov/Archives/



Form Type   Company Name                                                  CIK         Date Filed  File Name
---------------------------------------------------------------------------------------------------------------------------------------------
";

const FORMS: [&str; 4] = ["10-K", "10-Q", "8-K", "4"];

fn synthetic_index(rows: usize) -> String {
    let mut idx = String::from(HEADER);
    for i in 0..rows {
        let cik = 100_000 + i;
        idx.push_str(&format!(
            "{:<12}{:<62}{:<12}{}  edgar/data/{}/{:010}-23-{:06}.txt\n",
            FORMS[i % FORMS.len()],
            format!("COMPANY {} INC", i),
            cik,
            "2023-08-01",
            cik,
            cik,
            i
        ));
    }
    idx
}

fn synthetic_instance(facts: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrl xmlns="http://www.xbrl.org/2003/instance" xmlns:dei="http://xbrl.sec.gov/dei/2023" xmlns:us-gaap="http://fasb.org/us-gaap/2023">
  <context id="c-1">
    <entity><identifier scheme="http://www.sec.gov/CIK">0000320193</identifier></entity>
    <period><instant>2023-09-30</instant></period>
  </context>
  <dei:EntityCentralIndexKey contextRef="c-1">0000320193</dei:EntityCentralIndexKey>
"#,
    );
    for i in 0..facts {
        xml.push_str(&format!(
            "  <us-gaap:Concept{} contextRef=\"c-1\" unitRef=\"usd\" decimals=\"-6\">{}</us-gaap:Concept{}>\n",
            i,
            i * 1_000_000,
            i
        ));
    }
    xml.push_str("</xbrl>\n");
    xml
}

#[derive(Default)]
struct Sheet {
    first: i64,
    last: i64,
    cik: String,
}

edgarx::record!(Sheet {
    first: i64 => "us-gaap:Concept0",
    last: i64 => "us-gaap:Concept999",
    cik: String => "dei:EntityCentralIndexKey",
});

fn index_benchmarks(c: &mut Criterion) {
    let idx = synthetic_index(10_000);

    c.bench_function("parse_index_10k_rows", |b| {
        b.iter(|| parse_index(Cursor::new(black_box(idx.as_bytes()))));
    });
}

fn xbrl_benchmarks(c: &mut Criterion) {
    let parser = Parser::new();
    let xml = synthetic_instance(1_000);

    c.bench_function("parse_instance_1k_facts", |b| {
        b.iter(|| parser.parse_str(black_box(&xml)));
    });

    if let Ok(doc) = parser.parse_str(&xml) {
        c.bench_function("unpack_record", |b| {
            b.iter(|| {
                let mut sheet = Sheet::default();
                doc.unpack(&mut sheet, black_box(Cik::new(320193)))
                    .map(|_| (sheet.first, sheet.last, sheet.cik.len()))
            });
        });
    }
}

criterion_group!(benches, index_benchmarks, xbrl_benchmarks);
criterion_main!(benches);
