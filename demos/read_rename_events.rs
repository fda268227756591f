use rename_journal_rs::{
    correlate::RenameCorrelator,
    errors::JournalError,
    journal::{ReadOptions, UsnJournal},
    path::FrnPathResolver,
    volume::Volume,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
    }
}

fn run() -> Result<(), JournalError> {
    let drive_letter = 'C';
    let volume = Volume::from_drive_letter(drive_letter)?;

    let mut journal = UsnJournal::new(&volume)?;
    println!("journal identity: {:#?}", journal.identity());

    // Scan everything the journal still retains.
    journal.seek(journal.identity().lowest_valid_usn);

    let options = ReadOptions::default();
    let mut correlator = RenameCorrelator::new();
    let mut path_resolver = FrnPathResolver::new_with_cache(&volume);

    loop {
        let batch = journal.read_batch(&options)?;
        if batch.is_empty() {
            break;
        }

        let decoded = batch.decode_records();
        if decoded.malformed > 0 {
            eprintln!("skipped {} malformed records", decoded.malformed);
        }

        for record in &decoded.records {
            if let Some(event) = correlator.push(record) {
                let current_path = path_resolver.resolve(event.frn).ok();
                println!(
                    "rename: {} -> {} (frn={:#x}, now at {:?})",
                    event.old_name, event.new_name, event.frn, current_path
                );
            }
        }
    }

    let report = correlator.finish();
    println!(
        "done: {} events, {} unmatched new names, {} unmatched old names",
        report.events_emitted,
        report.unmatched_new_names.len(),
        report.unmatched_old_names.len()
    );

    Ok(())
}
