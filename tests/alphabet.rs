//! Cursor-stepping tests over a fixed A-Z table, the way the teacher's own `tests/alphabet.rs`
//! steps the same 26 keys through every block-size/restart-interval combination it cares about.
//! Here the dimension that varies is DBit presence and block size, since this crate has no
//! restart-interval knob (every key is a restart point).

use std::sync::Arc;

use seeksst::table::{TableBuilder, TableReader};
use seeksst::{Cursor, DBitOptions, TableBuilderOptions};

#[macro_export]
macro_rules! alphabet_tests {
    ($($name:ident: $alphabet:expr,)*) => {
    $(
        #[cfg(test)]
        mod $name {
            use seeksst::Cursor;

            #[test]
            fn step_the_alphabet_forward() {
                let mut cursor = $alphabet();
                cursor.seek_to_first().unwrap();
                assert_eq!(None, cursor.key());
                for letter in b'A'..=b'Z' {
                    cursor.next().unwrap();
                    assert_eq!(Some(&[letter][..]), cursor.key());
                    assert_eq!(Some(&[letter + 32][..]), cursor.value());
                }
                cursor.next().unwrap();
                assert_eq!(None, cursor.key());
            }

            #[test]
            fn step_the_alphabet_reverse() {
                let mut cursor = $alphabet();
                cursor.seek_to_last().unwrap();
                assert_eq!(None, cursor.key());
                for letter in (b'A'..=b'Z').rev() {
                    cursor.prev().unwrap();
                    assert_eq!(Some(&[letter][..]), cursor.key());
                    assert_eq!(Some(&[letter + 32][..]), cursor.value());
                }
                cursor.prev().unwrap();
                assert_eq!(None, cursor.key());
            }

            #[test]
            fn seek_lands_on_the_target_letter() {
                let mut cursor = $alphabet();
                cursor.seek(b"M").unwrap();
                assert_eq!(Some(&b"M"[..]), cursor.key());
                assert_eq!(Some(&b"m"[..]), cursor.value());
            }

            #[test]
            fn seek_between_letters_lands_on_the_next_one() {
                let mut cursor = $alphabet();
                cursor.seek(b"M5").unwrap();
                assert_eq!(Some(&b"N"[..]), cursor.key());
            }

            #[test]
            fn seek_for_prev_between_letters_lands_on_the_previous_one() {
                let mut cursor = $alphabet();
                cursor.seek_for_prev(b"M5").unwrap();
                assert_eq!(Some(&b"M"[..]), cursor.key());
            }

            #[test]
            fn seek_past_the_last_letter_is_exhausted() {
                let mut cursor = $alphabet();
                cursor.seek(b"zz").unwrap();
                assert_eq!(None, cursor.key());
            }
        }
    )*
    }
}

fn alphabet_table(options: TableBuilderOptions, dbit: DBitOptions) -> Arc<Vec<u8>> {
    let mut builder = TableBuilder::new(options, dbit);
    for letter in b'A'..=b'Z' {
        builder.add(&[letter], &[letter + 32]).unwrap();
    }
    Arc::new(builder.finish(None).unwrap())
}

fn alphabet_cursor(options: TableBuilderOptions, dbit: DBitOptions) -> seeksst::table::TableCursor<Arc<Vec<u8>>> {
    let bytes = alphabet_table(options, dbit);
    let reader = TableReader::<Arc<Vec<u8>>>::open(&bytes).unwrap();
    reader.cursor()
}

fn alphabet_one_block_dbit_enabled() -> seeksst::table::TableCursor<Arc<Vec<u8>>> {
    alphabet_cursor(
        TableBuilderOptions {
            block_size: 4096,
            page_alignment: 0,
        },
        DBitOptions {
            enabled: true,
            max_discriminators: 255,
        },
    )
}

alphabet_tests! {
    alphabet_one_block_dbit_enabled: crate::alphabet_one_block_dbit_enabled,
}

fn alphabet_one_block_dbit_disabled() -> seeksst::table::TableCursor<Arc<Vec<u8>>> {
    alphabet_cursor(
        TableBuilderOptions {
            block_size: 4096,
            page_alignment: 0,
        },
        DBitOptions {
            enabled: false,
            max_discriminators: 0,
        },
    )
}

alphabet_tests! {
    alphabet_one_block_dbit_disabled: crate::alphabet_one_block_dbit_disabled,
}

fn alphabet_many_small_blocks_dbit_enabled() -> seeksst::table::TableCursor<Arc<Vec<u8>>> {
    // Each key-value pair is 2 bytes; a block_size of 4 flushes roughly every other key, so the
    // alphabet spans many data blocks and exercises `TableCursor`'s block-to-block stepping.
    alphabet_cursor(
        TableBuilderOptions {
            block_size: 4,
            page_alignment: 0,
        },
        DBitOptions {
            enabled: true,
            max_discriminators: 255,
        },
    )
}

alphabet_tests! {
    alphabet_many_small_blocks_dbit_enabled: crate::alphabet_many_small_blocks_dbit_enabled,
}

fn alphabet_page_aligned_blocks() -> seeksst::table::TableCursor<Arc<Vec<u8>>> {
    alphabet_cursor(
        TableBuilderOptions {
            block_size: 8,
            page_alignment: 512,
        },
        DBitOptions {
            enabled: true,
            max_discriminators: 255,
        },
    )
}

alphabet_tests! {
    alphabet_page_aligned_blocks: crate::alphabet_page_aligned_blocks,
}
