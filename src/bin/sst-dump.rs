//! Dump key-value pairs from one or more tables to stdout.

use arrrg::CommandLine;

use seeksst::file_manager::{FileHandle, FileManager};
use seeksst::table::TableReader;
use seeksst::{Cursor, FileManagerOptions};

fn main() {
    let (opts, args) = FileManagerOptions::from_command_line("Usage: sst-dump [OPTIONS] [FILES]");
    let manager = FileManager::new(opts.max_open_files);
    for path in args {
        let handle = manager.open(&path).expect("could not open table file");
        let reader = TableReader::<FileHandle>::open(&handle).expect("could not open table");
        let mut cursor = reader.cursor();
        cursor.seek_to_first().expect("seek_to_first");
        cursor.next().expect("next");
        while let Some(key) = cursor.key() {
            let value = cursor.value().expect("key() returned Some so value() must too");
            println!(
                "{} => {}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
            cursor.next().expect("next");
        }
    }
}
