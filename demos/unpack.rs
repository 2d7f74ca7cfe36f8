//! Decodes a few balance sheet items from an XBRL instance

use edgarx::{Cik, Parser};
use std::env;

#[derive(Debug, Default)]
struct BalanceSheet {
    name: String,
    assets: i64,
    liabilities: i64,
    shares_outstanding: i64,
}

edgarx::record!(BalanceSheet {
    name: String => "dei:EntityRegistrantName",
    assets: i64 => "us-gaap:Assets",
    liabilities: i64 => "us-gaap:Liabilities",
    shares_outstanding: i64 => "dei:EntityCommonStockSharesOutstanding",
});

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <instance.xml> <cik> [instant]", args[0]);
        std::process::exit(1);
    }

    let doc = Parser::new().parse_file(&args[1])?;
    let cik: Cik = args[2].parse()?;

    let mut sheet = BalanceSheet::default();
    match args.get(3) {
        Some(instant) => doc.unpack_at(&mut sheet, cik, instant)?,
        None => doc.unpack(&mut sheet, cik)?,
    }

    println!("{:#?}", sheet);
    Ok(())
}
