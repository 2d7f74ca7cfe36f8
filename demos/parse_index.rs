//! Lists the 10-K and 10-Q filings in a form.idx file

use edgarx::{FormType, IndexEntries};
use std::env;
use std::fs::File;
use std::io::BufReader;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <form.idx>", args[0]);
        std::process::exit(1);
    }

    let file = File::open(&args[1])?;
    let mut annual = 0;
    let mut quarterly = 0;

    for entry in IndexEntries::new(BufReader::new(file)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("  skipped: {}", e);
                continue;
            }
        };
        match entry.form_type {
            FormType::TenK => annual += 1,
            FormType::TenQ => quarterly += 1,
        }
        if annual + quarterly <= 5 {
            println!(
                "  - {} {} {} {}",
                entry.form_type,
                entry.cik,
                entry.accession_number,
                entry.company_name.trim_end()
            );
        }
    }

    println!("Parsed {} successfully", args[1]);
    println!("  10-K: {}", annual);
    println!("  10-Q: {}", quarterly);

    Ok(())
}
