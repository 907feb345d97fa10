/*
 *     This file is part of Trellis.
 *
 *     Trellis is free software: you can redistribute it and/or modify
 *     it under the terms of the GNU Lesser General Public License as published by
 *     the Free Software Foundation, either version 3 of the License, or
 *     (at your option) any later version.
 *
 *     Trellis is distributed in the hope that it will be useful,
 *     but WITHOUT ANY WARRANTY; without even the implied warranty of
 *     MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *     GNU General Public License for more details.
 *
 *     You should have received a copy of the GNU Lesser General Public License
 *     along with Trellis. (LICENSE.md)  If not, see <https://www.gnu.org/licenses/>.
 */

use std::io::Cursor;

use super::arr_cp;
use crate::error::Error;
use crate::frame::VerificationType::*;
use crate::frame::{FrameKind, FrameVisitor, StackMapEntry, StackMapTable, VerificationType};
use crate::rw::ConstantPoolReadWrite;

fn round_trip(entry: StackMapEntry) {
    let mut cp = arr_cp(&["java/lang/String", "java/lang/Object"]);
    let mut buf = Vec::new();
    entry.write_to(&mut cp, &mut buf).unwrap();
    assert_eq!(entry.size(), buf.len(), "size must predict encoding: {}", entry);
    let read = StackMapEntry::read_from(&mut cp, &mut Cursor::new(buf)).unwrap();
    assert_eq!(entry, read);
}

#[test]
fn round_trip_all_families() {
    // boundary tags of every family: 0/63, 64(126/127 via offset 62/63), 247,
    // 248/250, 251, 252/254, 255
    round_trip(StackMapEntry::Same { offset_delta: 0 });
    round_trip(StackMapEntry::Same { offset_delta: 63 });
    round_trip(StackMapEntry::SameLocals1Stack {
        offset_delta: 0,
        stack_item: Int,
    });
    round_trip(StackMapEntry::SameLocals1Stack {
        offset_delta: 62,
        stack_item: Long,
    });
    round_trip(StackMapEntry::SameLocals1Stack {
        offset_delta: 63,
        stack_item: Object("java/lang/String".into()),
    });
    round_trip(StackMapEntry::SameLocals1StackExtended {
        offset_delta: 64,
        stack_item: Uninitialized(17),
    });
    round_trip(StackMapEntry::SameLocals1StackExtended {
        offset_delta: 32767,
        stack_item: Top,
    });
    round_trip(StackMapEntry::Chop {
        offset_delta: 9,
        chopped: 1,
    });
    round_trip(StackMapEntry::Chop {
        offset_delta: 9,
        chopped: 3,
    });
    round_trip(StackMapEntry::SameExtended { offset_delta: 64 });
    round_trip(StackMapEntry::Append {
        offset_delta: 3,
        locals: vec![Float],
    });
    round_trip(StackMapEntry::Append {
        offset_delta: 3,
        locals: vec![Double, Null, Object("java/lang/Object".into())],
    });
    round_trip(StackMapEntry::Full {
        offset_delta: 0,
        locals: vec![],
        stack_items: vec![],
    });
    round_trip(StackMapEntry::Full {
        offset_delta: 1000,
        locals: vec![UninitializedThis, Object("java/lang/String".into()), Int],
        stack_items: vec![Uninitialized(4), Top],
    });
}

#[test]
fn frame_writing() {
    let mut cp = arr_cp(&["java/lang/Object"]);
    let mut buf = Vec::new();
    let entry = StackMapEntry::Full {
        offset_delta: 5,
        locals: vec![Int, Object("java/lang/Object".into()), Uninitialized(9)],
        stack_items: vec![Top],
    };
    entry.write_to(&mut cp, &mut buf).unwrap();
    assert_eq!(
        buf,
        vec![
            255, // FULL
            0, 5, // offset delta
            0, 3, // number of locals
            1, // Int
            7, 0, 1, // Object #1
            8, 0, 9, // Uninitialized @9
            0, 1, // number of stack items
            0, // Top
        ]
    );
    assert_eq!(entry.size(), buf.len());
}

#[test]
fn frame_reading() {
    let mut cp = arr_cp(&["java/lang/String"]);
    let bytes = [
        70, // SAME_LOCALS_1_STACK, offset delta 6
        7, 0, 1, // Object #1
    ];
    let entry = StackMapEntry::read_from(&mut cp, &mut Cursor::new(bytes)).unwrap();
    assert_eq!(
        entry,
        StackMapEntry::SameLocals1Stack {
            offset_delta: 6,
            stack_item: Object("java/lang/String".into()),
        }
    );
    assert_eq!(entry.frame_type(), 70);
    assert_eq!(entry.kind(), FrameKind::SameLocals1Stack);
}

#[test]
fn reserved_tags_are_rejected() {
    let mut cp = arr_cp(&[]);
    for tag in [128u8, 200, 246].iter() {
        let res = StackMapEntry::read_from(&mut cp, &mut Cursor::new([*tag]));
        assert!(matches!(res, Err(Error::Invalid(_, _))), "tag {}", tag);
    }
}

#[test]
fn truncated_entry_is_an_io_error() {
    let mut cp = arr_cp(&[]);
    // 247 mandates a 16-bit offset and one stack item
    let res = StackMapEntry::read_from(&mut cp, &mut Cursor::new([247, 0]));
    assert!(matches!(res, Err(Error::IO(_))));
}

#[test]
fn unknown_verification_type_tag() {
    let mut cp = arr_cp(&[]);
    let res = VerificationType::read_from(&mut cp, &mut Cursor::new([9]));
    assert!(matches!(res, Err(Error::Invalid(_, _))));
}

#[test]
fn size_matches_encoding_with_mixed_types() {
    // one- and three-byte verification types mixed in the same arrays
    let entry = StackMapEntry::Full {
        offset_delta: 20,
        locals: vec![Int, Object("a/B".into()), Long, Uninitialized(0)],
        stack_items: vec![Object("c/D".into()), Null],
    };
    // 1 + 2 + 2 + (1 + 3 + 1 + 3) + 2 + (3 + 1)
    assert_eq!(entry.size(), 19);
    let mut cp = arr_cp(&[]);
    let mut buf = Vec::new();
    entry.write_to(&mut cp, &mut buf).unwrap();
    assert_eq!(buf.len(), 19);
}

#[test]
fn offset_promotion_and_demotion() {
    let mut entry = StackMapEntry::Same { offset_delta: 5 };
    entry.set_offset_delta(200).unwrap();
    assert_eq!(entry, StackMapEntry::SameExtended { offset_delta: 200 });

    let mut entry = StackMapEntry::Same { offset_delta: 5 };
    entry.set_offset_delta(10).unwrap();
    assert_eq!(entry, StackMapEntry::Same { offset_delta: 10 });
    entry.update_offset_delta(-5).unwrap();
    assert_eq!(entry, StackMapEntry::Same { offset_delta: 5 });

    let mut entry = StackMapEntry::SameLocals1Stack {
        offset_delta: 63,
        stack_item: Int,
    };
    entry.set_offset_delta(64).unwrap();
    assert_eq!(
        entry,
        StackMapEntry::SameLocals1StackExtended {
            offset_delta: 64,
            stack_item: Int,
        }
    );

    // the extended families keep their tag even for small offsets
    let mut entry = StackMapEntry::SameExtended { offset_delta: 100 };
    entry.set_offset_delta(1).unwrap();
    assert_eq!(entry, StackMapEntry::SameExtended { offset_delta: 1 });

    let mut entry = StackMapEntry::Chop {
        offset_delta: 9,
        chopped: 2,
    };
    entry.set_offset_delta(3).unwrap();
    assert_eq!(
        entry,
        StackMapEntry::Chop {
            offset_delta: 3,
            chopped: 2,
        }
    );
}

#[test]
fn offset_range_is_enforced() {
    let mut entry = StackMapEntry::Same { offset_delta: 5 };
    assert!(matches!(
        entry.set_offset_delta(32768),
        Err(Error::Invalid(_, _))
    ));
    assert_eq!(entry, StackMapEntry::Same { offset_delta: 5 });
    assert!(matches!(
        entry.update_offset_delta(-6),
        Err(Error::Invalid(_, _))
    ));
    assert_eq!(entry, StackMapEntry::Same { offset_delta: 5 });
    entry.set_offset_delta(32767).unwrap();
    assert_eq!(entry, StackMapEntry::SameExtended { offset_delta: 32767 });
}

#[test]
fn set_frame_type_rederives_offsets() {
    let mut entry = StackMapEntry::Same { offset_delta: 5 };
    entry.set_frame_type(20).unwrap();
    assert_eq!(entry, StackMapEntry::Same { offset_delta: 20 });

    // non-SAME-family tags keep the stored offset
    entry.set_frame_type(251).unwrap();
    assert_eq!(entry, StackMapEntry::SameExtended { offset_delta: 20 });
    entry.set_frame_type(249).unwrap();
    assert_eq!(
        entry,
        StackMapEntry::Chop {
            offset_delta: 20,
            chopped: 2,
        }
    );

    let mut entry = StackMapEntry::Full {
        offset_delta: 36,
        locals: vec![],
        stack_items: vec![Float],
    };
    entry.set_frame_type(100).unwrap();
    assert_eq!(
        entry,
        StackMapEntry::SameLocals1Stack {
            offset_delta: 36,
            stack_item: Float,
        }
    );
}

#[test]
fn set_frame_type_rejects_bad_tags() {
    let original = StackMapEntry::Same { offset_delta: 5 };
    let mut entry = original.clone();
    assert!(matches!(entry.set_frame_type(300), Err(Error::Invalid(_, _))));
    assert_eq!(entry, original);
    assert!(matches!(entry.set_frame_type(128), Err(Error::Invalid(_, _))));
    assert_eq!(entry, original);
}

#[test]
fn set_frame_type_never_drops_types() {
    let original = StackMapEntry::Append {
        offset_delta: 7,
        locals: vec![Int, Long],
    };
    let mut entry = original.clone();
    // SAME cannot carry two locals
    assert!(matches!(entry.set_frame_type(0), Err(Error::Invalid(_, _))));
    assert_eq!(entry, original);
    // APPEND with the wrong arity cannot either
    assert!(matches!(entry.set_frame_type(252), Err(Error::Invalid(_, _))));
    assert_eq!(entry, original);
    // FULL can carry anything
    entry.set_frame_type(255).unwrap();
    assert_eq!(
        entry,
        StackMapEntry::Full {
            offset_delta: 7,
            locals: vec![Int, Long],
            stack_items: vec![],
        }
    );
}

#[test]
fn encoding_validates_range_invariants() {
    let mut cp = arr_cp(&[]);
    let mut buf = Vec::new();
    // a compact SAME cannot carry an offset above 63
    let entry = StackMapEntry::Same { offset_delta: 200 };
    assert!(matches!(
        entry.write_to(&mut cp, &mut buf),
        Err(Error::Invalid(_, _))
    ));
    let entry = StackMapEntry::Chop {
        offset_delta: 0,
        chopped: 0,
    };
    assert!(matches!(
        entry.write_to(&mut cp, &mut buf),
        Err(Error::Invalid(_, _))
    ));
    let entry = StackMapEntry::Append {
        offset_delta: 0,
        locals: vec![Int, Int, Int, Int],
    };
    assert!(matches!(
        entry.write_to(&mut cp, &mut buf),
        Err(Error::Invalid(_, _))
    ));
    let entry = StackMapEntry::SameExtended {
        offset_delta: 40000,
    };
    assert!(matches!(
        entry.write_to(&mut cp, &mut buf),
        Err(Error::Invalid(_, _))
    ));
}

#[test]
fn table_round_trip() {
    let table = StackMapTable {
        entries: vec![
            StackMapEntry::Same { offset_delta: 0 },
            StackMapEntry::Append {
                offset_delta: 12,
                locals: vec![Int, Object("java/lang/String".into())],
            },
            StackMapEntry::Chop {
                offset_delta: 40,
                chopped: 2,
            },
        ],
    };
    let mut cp = arr_cp(&[]);
    let mut buf = Vec::new();
    table.write_to(&mut cp, &mut buf).unwrap();
    assert_eq!(table.size(), buf.len());
    let read = StackMapTable::read_from(&mut cp, &mut Cursor::new(buf)).unwrap();
    assert_eq!(table, read);
}

#[test]
fn display_formats() {
    assert_eq!(
        StackMapEntry::Same { offset_delta: 5 }.to_string(),
        "(SAME, offset delta=5)"
    );
    assert_eq!(
        StackMapEntry::Chop {
            offset_delta: 70,
            chopped: 2,
        }
        .to_string(),
        "(CHOP 2, offset delta=70)"
    );
    assert_eq!(
        StackMapEntry::Append {
            offset_delta: 3,
            locals: vec![Int, Object("java/lang/String".into())],
        }
        .to_string(),
        "(APPEND 2, offset delta=3, locals={Int, Object(java/lang/String)})"
    );
    assert_eq!(
        StackMapEntry::Full {
            offset_delta: 9,
            locals: vec![Long],
            stack_items: vec![Uninitialized(4)],
        }
        .to_string(),
        "(FULL, offset delta=9, locals={Long}, stack items={Uninitialized(4)})"
    );
}

#[test]
fn visitor_names_the_variant() {
    #[derive(Default)]
    struct Seen(Vec<&'static str>);
    impl FrameVisitor for Seen {
        fn visit_same(&mut self, _offset_delta: u16) {
            self.0.push("same");
        }
        fn visit_append(&mut self, _offset_delta: u16, locals: &[VerificationType]) {
            assert_eq!(locals.len(), 1);
            self.0.push("append");
        }
    }
    let mut seen = Seen::default();
    StackMapEntry::Same { offset_delta: 0 }.accept(&mut seen);
    StackMapEntry::Append {
        offset_delta: 0,
        locals: vec![Int],
    }
    .accept(&mut seen);
    assert_eq!(seen.0, vec!["same", "append"]);
}
