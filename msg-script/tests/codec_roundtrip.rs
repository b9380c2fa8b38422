use msg_moji::CharTable;
use msg_script::opcode::{OpcodeHandler, OperandCount, OperandWidth};
use msg_script::token::Operand;
use msg_script::{render_script, ArchiveEntryHeader, Decoder, Encoder, OpcodeTable, PointerTable};
use pretty_assertions::assert_eq;

const MOJI: &str = "00= \n41=A\n42=B\n43=C\nF801=가\nF802=나\n";

fn moji() -> CharTable {
    CharTable::parse(MOJI).unwrap()
}

/// Three records behind a 4-entry table (the last entry only closes record 2).
fn fixture() -> Vec<u8> {
    hex::decode(concat!(
        "0800", "0e00", "1a00", "1e00",
        // A 가 B end, with a line break
        "41f801fc42ff",
        // wait(%H100) pagekey nextpage(1,2,3)
        "fb080064fb18fd00010203ff",
        // 나 C end
        "f80243ff",
    ))
    .unwrap()
}

#[test]
fn decode_fixture() {
    let glyphs = moji();
    let decoder = Decoder::new(OpcodeTable::builtin(), &glyphs);
    let blob = fixture();
    let records = decoder.decode_blob(&blob, 0).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].text, "A가\tline\n\tB\n\tend");
    assert_eq!(records[1].text, "\n\twait(%H100)\n\tpagekey\n\tnextpage(1,2,3)\n\tend");
    assert_eq!(records[2].text, "나C\n\tend");
}

#[test]
fn decode_encode_decode_is_stable() {
    let glyphs = moji();
    let table = OpcodeTable::builtin();
    let decoder = Decoder::new(table, &glyphs);
    let encoder = Encoder::new(table, &glyphs);

    let blob = fixture();
    let first = decoder.decode_blob(&blob, 0).unwrap();
    let script = render_script(&first);

    let encoded = encoder.encode_script(&script).unwrap();
    // one block per record plus the empty block after the final `--`
    assert_eq!(encoded.pointers.record_count(), first.len() + 1);
    // the final entry lands where the fixture's closing entry was
    assert_eq!(encoded.to_bytes(), blob);

    let second = decoder.decode_blob(&encoded.to_bytes(), 0).unwrap();
    assert_eq!(second, first);
    assert_eq!(render_script(&second), script);
}

#[test]
fn encoded_pointers_describe_the_records() {
    let glyphs = moji();
    let encoder = Encoder::new(OpcodeTable::builtin(), &glyphs);
    let bytes = encoder
        .encode("\tAB\n\tend\n\t--\n\n\twait(%H1)\n\tend\n\t--\n\n")
        .unwrap();

    let table = PointerTable::read(&bytes, 0).unwrap();
    assert_eq!(table.offsets()[0] as usize, table.byte_len());
    let spans = table.spans().unwrap();
    assert_eq!(spans.len(), 2);
    for span in spans {
        assert_eq!(bytes[span.start + span.len - 1], 0xFF);
    }
    assert_eq!(*table.offsets().last().unwrap() as usize, bytes.len());
}

#[test]
fn decode_at_base_offset() {
    let mut blob = vec![0xEE; 0x24];
    blob.extend(fixture());
    let glyphs = moji();
    let decoder = Decoder::new(OpcodeTable::builtin(), &glyphs);
    let records = decoder.decode_blob(&blob, 0x24).unwrap();
    assert_eq!(records[2].text, "나C\n\tend");
}

#[test]
fn every_generic_opcode_survives_a_round_trip() {
    let glyphs = moji();
    let table = OpcodeTable::builtin();
    let decoder = Decoder::new(table, &glyphs);
    let encoder = Encoder::new(table, &glyphs);

    for handler in table.handlers() {
        let OpcodeHandler::Generic(spec) = handler else {
            continue;
        };
        let (count, mut operands) = match spec.count {
            OperandCount::Fixed(n) => (n as usize, Vec::new()),
            OperandCount::LengthPrefixed => (3, vec![Operand::Byte(3)]),
        };
        for i in 0..count {
            let v = (i % 200) as u32 + 1;
            operands.push(match spec.width {
                OperandWidth::None | OperandWidth::Byte => Operand::Byte(v as u8),
                OperandWidth::Word => Operand::Word(v as u16 * 300),
                OperandWidth::Dword => Operand::Dword(v * 70_000),
            });
        }
        let args: Vec<String> = operands.iter().map(ToString::to_string).collect();
        let name = handler.display_name();
        let text = if args.is_empty() {
            format!("{name}\n\tend")
        } else {
            format!("{name}({})\n\tend", args.join(","))
        };

        let bytes = encoder.encode_script(&text).unwrap().records;
        let tokens = decoder.tokenize(&bytes, 0).unwrap();
        assert_eq!(decoder.render(&tokens), format!("\n\t{text}"), "opcode {name}");
    }
}

#[test]
fn config_opcodes_reach_both_directions() {
    let config: msg_script::ProjectConfig =
        toml::from_str("[[opcodes]]\ncode = 0xfb4d\ncount = 2\nwidth = 2\nmnemonic = \"shake\"\n").unwrap();
    let table = config.opcode_table().unwrap();
    let glyphs = moji();

    let bytes = Encoder::new(&table, &glyphs)
        .encode_script("A\n\tshake(%H1,%H2)\n\tend")
        .unwrap()
        .records;
    assert_eq!(hex::encode(&bytes), "41fb4d00010002ff");

    let decoder = Decoder::new(&table, &glyphs);
    let tokens = decoder.tokenize(&bytes, 0).unwrap();
    assert_eq!(decoder.render(&tokens), "A\n\tshake(%H1,%H2)\n\tend");
}

#[test]
fn header_for_encoded_script() {
    let glyphs = moji();
    let blob = Encoder::new(OpcodeTable::builtin(), &glyphs).encode("A\n\tend--").unwrap();
    let (header, padded) = ArchiveEntryHeader::wrap(&blob).unwrap();
    assert_eq!(header.raw_size as usize, blob.len());
    assert_eq!(header.padded_chunks, 1);
    assert_eq!(padded.len(), 0x800 - 0x30);
    assert_eq!(&padded[..blob.len()], &blob[..]);
}
