//! Randomized key/value generators and a seek/step fuzzer, in the same shape as the teacher's own
//! `tests/guacamole.rs`: small `*Guacamole` structs that each know how to manufacture one piece of
//! a key-value pair, composed into a workload generator, checked against [seeksst::reference]'s
//! oracle.

use std::sync::Arc;

use guacamole::Guacamole;
use rand::{Rng, RngCore};

use seeksst::reference::ReferenceBuilder;
use seeksst::table::{TableBuilder, TableReader};
use seeksst::{Cursor, DBitOptions, TableBuilderOptions};

/////////////////////////////////////////// BufferGuacamole ////////////////////////////////////////

#[derive(Debug)]
pub struct BufferGuacamole {
    pub sz: usize,
}

impl BufferGuacamole {
    fn new(sz: usize) -> Self {
        Self { sz }
    }

    fn guacamole(&self, guac: &mut Guacamole) -> Vec<u8> {
        let mut buf = vec![0u8; self.sz];
        guac.fill_bytes(&mut buf);
        buf
    }
}

//////////////////////////////////////////// KeyValuePut ///////////////////////////////////////////

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct KeyValuePut {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/////////////////////////////////////// KeyValuePutGuacamole ///////////////////////////////////////

pub struct KeyValuePutGuacamole {
    pub key: BufferGuacamole,
    pub value: BufferGuacamole,
}

impl KeyValuePutGuacamole {
    fn guacamole(&self, guac: &mut Guacamole) -> KeyValuePut {
        KeyValuePut {
            key: self.key.guacamole(guac),
            value: self.value.guacamole(guac),
        }
    }
}

////////////////////////////////////////////// fuzzer //////////////////////////////////////////////

pub struct FuzzerConfig {
    pub key_bytes: usize,
    pub value_bytes: usize,
    pub num_keys: u64,
    pub num_seeks: u64,
    pub seek_distance: u64,
    pub prev_probability: f64,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            key_bytes: 4,
            value_bytes: 16,
            num_keys: 1000,
            num_seeks: 500,
            seek_distance: 10,
            prev_probability: 0.1,
        }
    }
}

/// Puts `config.num_keys` random key-value pairs into a [ReferenceBuilder], builds a real table
/// from the same (deduplicated, sorted) sequence, then drives both cursors through the same
/// random seek/next/prev workload and checks they always agree.
fn fuzzer(seed: u64, config: FuzzerConfig, options: TableBuilderOptions, dbit: DBitOptions) {
    let mut guac = Guacamole::new(seed);
    let gen = KeyValuePutGuacamole {
        key: BufferGuacamole::new(config.key_bytes),
        value: BufferGuacamole::new(config.value_bytes),
    };
    let mut reference = ReferenceBuilder::default();
    for _ in 0..config.num_keys {
        let kvp = gen.guacamole(&mut guac);
        reference.put(&kvp.key, &kvp.value).unwrap();
    }
    let reference = reference.seal().unwrap();

    let mut builder = TableBuilder::new(options, dbit);
    let mut ref_cursor = reference.cursor();
    ref_cursor.seek_to_first().unwrap();
    loop {
        ref_cursor.next().unwrap();
        match ref_cursor.key_value() {
            Some(kvr) => builder.add(kvr.key, kvr.value).unwrap(),
            None => break,
        }
    }
    let bytes = Arc::new(builder.finish(None).unwrap());
    let table = TableReader::<Arc<Vec<u8>>>::open(&bytes).unwrap();

    let key_gen = BufferGuacamole::new(config.key_bytes);
    for _ in 0..config.num_seeks {
        let key = key_gen.guacamole(&mut guac);
        ref_cursor.seek(&key).unwrap();
        let mut cursor = table.cursor();
        cursor.seek(&key).unwrap();
        assert_eq!(ref_cursor.key(), cursor.key(), "seeking to {key:?}");
        assert_eq!(ref_cursor.value(), cursor.value(), "seeking to {key:?}");
        for _ in 0..config.seek_distance {
            let go_backward = guac.gen_range(0.0..1.0) < config.prev_probability;
            if go_backward {
                ref_cursor.prev().unwrap();
                cursor.prev().unwrap();
            } else {
                ref_cursor.next().unwrap();
                cursor.next().unwrap();
            }
            assert_eq!(ref_cursor.key(), cursor.key());
            assert_eq!(ref_cursor.value(), cursor.value());
        }
    }
}

#[test]
fn fuzz_small_table_one_data_block() {
    fuzzer(
        1,
        FuzzerConfig::default(),
        TableBuilderOptions {
            block_size: 1 << 20,
            page_alignment: 0,
        },
        DBitOptions::default(),
    );
}

#[test]
fn fuzz_many_small_data_blocks() {
    fuzzer(
        2,
        FuzzerConfig {
            num_keys: 2000,
            ..FuzzerConfig::default()
        },
        TableBuilderOptions {
            block_size: 64,
            page_alignment: 0,
        },
        DBitOptions::default(),
    );
}

#[test]
fn fuzz_dbit_disabled_matches_dbit_enabled() {
    let options = TableBuilderOptions {
        block_size: 256,
        page_alignment: 0,
    };
    fuzzer(
        3,
        FuzzerConfig::default(),
        options,
        DBitOptions {
            enabled: false,
            max_discriminators: 0,
        },
    );
}

#[test]
fn fuzz_page_aligned_blocks() {
    fuzzer(
        4,
        FuzzerConfig {
            num_keys: 500,
            ..FuzzerConfig::default()
        },
        TableBuilderOptions {
            block_size: 128,
            page_alignment: 4096,
        },
        DBitOptions::default(),
    );
}

#[test]
fn fuzz_wide_keys_multi_byte_dbit_mask() {
    // Longer keys push some discriminative bits past the first byte, exercising DBitIndex's
    // multi-byte mask path rather than the common first-byte case the other fuzzers mostly hit.
    fuzzer(
        5,
        FuzzerConfig {
            key_bytes: 24,
            num_keys: 800,
            ..FuzzerConfig::default()
        },
        TableBuilderOptions {
            block_size: 512,
            page_alignment: 0,
        },
        DBitOptions::default(),
    );
}
