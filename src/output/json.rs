// Streaming JSON rendering.
//
// The whole decode becomes one JSON object: each key contributes a
// member whose shape follows the record's logical type (strings and
// modules inline, lists and sets as arrays, hashes, zsets and streams
// as objects). Metadata records become top-level members too, but only
// when requested. Nothing is buffered; every hook appends to the writer
// as it fires, so the output of an aborted decode is exactly the
// records that made it through, an open object with no closing brace.

use std::fmt;
use std::io::{self, Write};

use crate::rdb::{
    ConsPendInfo, ConsumerInfo, GroupInfo, HashEntry, ListElem, PendInfo, RecordType, SetMember,
    Sink, StreamEntry, StreamInfo, StreamPart, Value, ZSetMember,
};

use super::{escaped, value_text};

/// `Sink` that renders the decode as a JSON document.
pub struct JsonWriter<W: Write> {
    out: W,
    show_meta: bool,
    /// Top-level members emitted so far, for comma placement.
    members: u64,
    /// Type of the record being decoded, set by `start_type`. Selects
    /// the member's bracket shape.
    rtype: RecordType,
    status: io::Result<()>,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(out: W) -> JsonWriter<W> {
        JsonWriter {
            out,
            show_meta: false,
            members: 0,
            rtype: RecordType::String,
            status: Ok(()),
        }
    }

    /// Include idle/freq/aux/dbresize/expire/dbselect members.
    pub fn show_meta(mut self, yes: bool) -> JsonWriter<W> {
        self.show_meta = yes;
        self
    }

    /// Hands back the writer, or the first write error any hook hit.
    pub fn into_inner(self) -> io::Result<W> {
        self.status?;
        Ok(self.out)
    }

    fn put(&mut self, args: fmt::Arguments<'_>) {
        if self.status.is_ok() {
            if let Err(e) = self.out.write_fmt(args) {
                self.status = Err(e);
            }
        }
    }

    /// Separator before a top-level member.
    fn comma_nl(&mut self) {
        if self.members != 0 {
            self.put(format_args!(",\n"));
        }
        self.members += 1;
    }

    /// Separator and indent before a nested element. `follow` is true
    /// for every element after the first.
    fn sep(&mut self, follow: bool, depth: usize) {
        if follow {
            self.put(format_args!(",\n"));
        }
        for _ in 0..depth {
            self.put(format_args!("  "));
        }
    }

    fn value(&mut self, v: &Value, quoted: bool) {
        let t = value_text(v, quoted);
        self.put(format_args!("{t}"));
    }
}

impl<W: Write> Sink for JsonWriter<W> {
    fn begin(&mut self) {
        self.put(format_args!("{{\n"));
    }

    fn finish(&mut self, ok: bool) {
        if ok {
            self.put(format_args!("\n}}\n"));
        } else {
            self.put(format_args!("\n"));
        }
        if self.status.is_ok() {
            if let Err(e) = self.out.flush() {
                self.status = Err(e);
            }
        }
    }

    fn idle(&mut self, secs: u64) {
        if self.show_meta {
            self.comma_nl();
            self.put(format_args!("\"idle\" : {secs}"));
        }
    }

    fn freq(&mut self, lfu: u8) {
        if self.show_meta {
            self.comma_nl();
            self.put(format_args!("\"freq\" : {lfu}"));
        }
    }

    fn aux(&mut self, var: &Value, val: &Value) {
        if self.show_meta {
            self.comma_nl();
            self.value(var, true);
            self.put(format_args!(" : "));
            self.value(val, true);
        }
    }

    fn db_resize(&mut self, main: u64, expires: u64) {
        if self.show_meta {
            self.comma_nl();
            self.put(format_args!("\"dbresize\" : [{main}, {expires}]"));
        }
    }

    fn expired_ms(&mut self, ms: u64) {
        if self.show_meta {
            self.comma_nl();
            self.put(format_args!("\"expire_ms\" : {ms}"));
        }
    }

    fn db_select(&mut self, db: u64) {
        if self.show_meta {
            self.comma_nl();
            self.put(format_args!("\"dbselect\" : {db}"));
        }
    }

    fn start_type(&mut self, rtype: RecordType, _offset: u64) {
        self.rtype = rtype;
    }

    fn start_key(&mut self, key: &Value) {
        self.comma_nl();
        match key {
            // dump payloads have no key; stand in the type name
            Value::Absent => {
                let typ = self.rtype.name();
                self.put(format_args!("\"{typ}\""));
            }
            Value::Str(_) => self.value(key, true),
            // integer keys still need quoting to be a member name
            _ => {
                self.put(format_args!("\""));
                self.value(key, true);
                self.put(format_args!("\""));
            }
        }
        let open = match self.rtype.name() {
            "string" | "module" => " : ",
            "list" | "set" => " : [\n",
            _ => " : {\n",
        };
        self.put(format_args!("{open}"));
    }

    fn end_key(&mut self) {
        match self.rtype.name() {
            "string" | "module" => {}
            "list" | "set" => self.put(format_args!("\n]")),
            _ => self.put(format_args!("\n}}")),
        }
    }

    fn string(&mut self, value: &Value) {
        self.value(value, true);
    }

    fn module(&mut self, name: &str) {
        let e = escaped(name.as_bytes());
        self.put(format_args!("\"{e}\""));
    }

    fn hash(&mut self, entry: &HashEntry) {
        self.sep(entry.index > 1, 1);
        self.value(&entry.field, true);
        self.put(format_args!(" : "));
        self.value(&entry.value, true);
    }

    fn list(&mut self, elem: &ListElem) {
        self.sep(elem.index > 1, 1);
        self.value(&elem.value, true);
    }

    fn set(&mut self, member: &SetMember) {
        self.sep(member.index > 1, 1);
        self.value(&member.member, true);
    }

    fn zset(&mut self, member: &ZSetMember) {
        self.sep(member.index > 1, 1);
        self.value(&member.member, true);
        self.put(format_args!(" : "));
        self.value(&member.score, true);
    }

    fn stream_start(&mut self, part: StreamPart) {
        match part {
            StreamPart::EntryList => self.put(format_args!("  \"entries\" : [\n")),
            StreamPart::GroupList => self.put(format_args!(",\n  \"groups\" : [\n")),
            StreamPart::PendingList => self.put(format_args!(",\n    \"pel\" : [\n")),
            StreamPart::ConsumerList => self.put(format_args!(",\n      \"consumers\" : [\n")),
            StreamPart::ConsumerPendingList => self.put(format_args!(",\n        \"pel\" : [\n")),
            StreamPart::Group | StreamPart::Consumer => {}
        }
    }

    fn stream_end(&mut self, part: StreamPart) {
        match part {
            StreamPart::EntryList => self.put(format_args!(" ],\n")),
            StreamPart::Group | StreamPart::Consumer => self.put(format_args!(" }}")),
            _ => self.put(format_args!(" ]")),
        }
    }

    fn stream_entry(&mut self, entry: &StreamEntry<'_>) {
        self.sep(entry.index > 1, 2);
        self.put(format_args!("{{ \"id\" : \"{}\", ", entry.id));
        for (i, (f, v)) in entry.fields.iter().zip(entry.values.iter()).enumerate() {
            if i > 0 {
                self.put(format_args!(", "));
            }
            match &f.data {
                Some(d) => {
                    let e = escaped(d);
                    self.put(format_args!("\"{e}\" : "));
                }
                None => self.put(format_args!("\"{}\" : ", f.ival)),
            }
            match &v.data {
                Some(d) => {
                    let e = escaped(d);
                    self.put(format_args!("\"{e}\""));
                }
                None => self.put(format_args!("{}", v.ival)),
            }
        }
        self.put(format_args!(" }}"));
    }

    fn stream_info(&mut self, info: &StreamInfo) {
        self.put(format_args!(
            "  \"last_id\" : \"{}\",\n  \"num_elems\" : {},\n  \"num_cgroups\" : {}",
            info.last, info.num_elems, info.num_cgroups
        ));
    }

    fn stream_group(&mut self, _info: &StreamInfo, group: &GroupInfo) {
        self.sep(group.index > 1, 2);
        let name = escaped(&group.name);
        self.put(format_args!(
            "{{ \"group\" : \"{}\", \"pending\" : {}, \"last_id\" : \"{}\"",
            name, group.pending, group.last
        ));
    }

    fn stream_pend(&mut self, _group: &GroupInfo, pend: &PendInfo) {
        self.sep(pend.index > 1, 4);
        self.put(format_args!(
            "{{ \"id\" : \"{}\", \"last_d\" : {}, \"d_cnt\" : {} }}",
            pend.id, pend.last_delivery, pend.delivery_count
        ));
    }

    fn stream_consumer(&mut self, _group: &GroupInfo, consumer: &ConsumerInfo) {
        self.sep(consumer.index > 1, 4);
        let name = escaped(&consumer.name);
        self.put(format_args!(
            "{{ \"name\" : \"{}\", \"pending\" : {}, \"last_seen\" : {}",
            name, consumer.pending, consumer.last_seen
        ));
    }

    fn stream_consumer_pend(&mut self, _consumer: &ConsumerInfo, pend: &ConsPendInfo) {
        self.sep(pend.index > 1, 5);
        self.put(format_args!("\"{}\"", pend.id));
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::rdb::types::{EntryFlags, PackValue, StreamId};

    use super::*;

    fn s(v: &'static [u8]) -> Value {
        Value::Str(Bytes::from_static(v))
    }

    fn render(f: impl FnOnce(&mut JsonWriter<Vec<u8>>)) -> String {
        let mut w = JsonWriter::new(Vec::new());
        f(&mut w);
        String::from_utf8(w.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn single_string_member() {
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::String, 9);
            w.start_key(&s(b"k"));
            w.string(&s(b"v"));
            w.end_key();
            w.finish(true);
        });
        assert_eq!(got, "{\n\"k\" : \"v\"\n}\n");
    }

    #[test]
    fn failed_decode_leaves_object_open() {
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::String, 9);
            w.start_key(&s(b"k"));
            w.string(&s(b"v"));
            w.end_key();
            w.finish(false);
        });
        assert_eq!(got, "{\n\"k\" : \"v\"\n");
    }

    #[test]
    fn hash_members_and_integer_values() {
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::Hash, 9);
            w.start_key(&s(b"h"));
            w.hash(&HashEntry {
                field: s(b"a"),
                value: Value::Int(1),
                index: 1,
                count: Some(2),
            });
            w.hash(&HashEntry {
                field: s(b"b"),
                value: s(b"x"),
                index: 2,
                count: Some(2),
            });
            w.end_key();
            w.finish(true);
        });
        assert_eq!(
            got,
            "{\n\"h\" : {\n  \"a\" : 1,\n  \"b\" : \"x\"\n}\n}\n"
        );
    }

    #[test]
    fn list_array_and_second_key_comma() {
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::ListQuicklist, 9);
            w.start_key(&s(b"l"));
            w.list(&ListElem { value: Value::Int(10), index: 1, count: None });
            w.list(&ListElem { value: s(b"two"), index: 2, count: None });
            w.end_key();
            w.start_type(RecordType::String, 40);
            w.start_key(&s(b"k"));
            w.string(&Value::Int(5));
            w.end_key();
            w.finish(true);
        });
        assert_eq!(
            got,
            "{\n\"l\" : [\n  10,\n  \"two\"\n],\n\"k\" : 5\n}\n"
        );
    }

    #[test]
    fn zset_scores_and_sentinels() {
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::ZSet2, 9);
            w.start_key(&s(b"z"));
            w.zset(&ZSetMember {
                member: s(b"m"),
                score: Value::Double(3.25),
                index: 1,
                count: Some(2),
            });
            w.zset(&ZSetMember {
                member: s(b"n"),
                score: s(b"inf"),
                index: 2,
                count: Some(2),
            });
            w.end_key();
            w.finish(true);
        });
        assert_eq!(
            got,
            "{\n\"z\" : {\n  \"m\" : 3.25,\n  \"n\" : \"inf\"\n}\n}\n"
        );
    }

    #[test]
    fn absent_key_uses_the_type_name() {
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::SetIntset, 0);
            w.start_key(&Value::Absent);
            w.set(&SetMember { member: Value::Int(1), index: 1, count: Some(1) });
            w.end_key();
            w.finish(true);
        });
        assert_eq!(got, "{\n\"set\" : [\n  1\n]\n}\n");
    }

    #[test]
    fn integer_key_is_quoted() {
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::String, 9);
            w.start_key(&Value::Int(42));
            w.string(&s(b"v"));
            w.end_key();
            w.finish(true);
        });
        assert_eq!(got, "{\n\"42\" : \"v\"\n}\n");
    }

    #[test]
    fn metadata_hidden_by_default() {
        let got = render(|w| {
            w.begin();
            w.aux(&s(b"redis-ver"), &s(b"6.0.5"));
            w.db_select(0);
            w.start_type(RecordType::String, 20);
            w.start_key(&s(b"k"));
            w.string(&s(b"v"));
            w.end_key();
            w.finish(true);
        });
        assert_eq!(got, "{\n\"k\" : \"v\"\n}\n");
    }

    #[test]
    fn metadata_members_when_enabled() {
        let mut w = JsonWriter::new(Vec::new()).show_meta(true);
        w.begin();
        w.aux(&s(b"redis-ver"), &s(b"6.0.5"));
        w.db_select(0);
        w.db_resize(4, 1);
        w.expired_ms(1700000000000);
        w.idle(30);
        w.freq(5);
        w.start_type(RecordType::String, 60);
        w.start_key(&s(b"k"));
        w.string(&s(b"v"));
        w.end_key();
        w.finish(true);
        let got = String::from_utf8(w.into_inner().unwrap()).unwrap();
        assert_eq!(
            got,
            concat!(
                "{\n",
                "\"redis-ver\" : \"6.0.5\",\n",
                "\"dbselect\" : 0,\n",
                "\"dbresize\" : [4, 1],\n",
                "\"expire_ms\" : 1700000000000,\n",
                "\"idle\" : 30,\n",
                "\"freq\" : 5,\n",
                "\"k\" : \"v\"\n",
                "}\n"
            )
        );
    }

    #[test]
    fn stream_rendering() {
        let id1 = StreamId::new(1, 0);
        let id2 = StreamId::new(2, 0);
        let f = [PackValue::str(Bytes::from_static(b"f1"))];
        let v1 = [PackValue::str(Bytes::from_static(b"v1"))];
        let v2 = [PackValue::int(7)];
        let info = StreamInfo { entry_count: 2, num_elems: 2, last: id2, num_cgroups: 1 };
        let group = GroupInfo {
            name: Bytes::from_static(b"grp"),
            last: id2,
            pending: 1,
            index: 1,
            count: 1,
        };
        let consumer = ConsumerInfo {
            name: Bytes::from_static(b"c1"),
            last_seen: 222,
            pending: 1,
            index: 1,
            count: 1,
        };
        let got = render(|w| {
            w.begin();
            w.start_type(RecordType::StreamListpack, 9);
            w.start_key(&s(b"st"));
            w.stream_start(StreamPart::EntryList);
            w.stream_entry(&StreamEntry {
                id: id1,
                flags: EntryFlags::default(),
                fields: &f,
                values: &v1,
                index: 1,
            });
            w.stream_entry(&StreamEntry {
                id: id2,
                flags: EntryFlags::default(),
                fields: &f,
                values: &v2,
                index: 2,
            });
            w.stream_end(StreamPart::EntryList);
            w.stream_info(&info);
            w.stream_start(StreamPart::GroupList);
            w.stream_group(&info, &group);
            w.stream_start(StreamPart::PendingList);
            w.stream_pend(
                &group,
                &PendInfo {
                    id: id1,
                    last_delivery: 111,
                    delivery_count: 2,
                    index: 1,
                    count: 1,
                },
            );
            w.stream_end(StreamPart::PendingList);
            w.stream_start(StreamPart::ConsumerList);
            w.stream_consumer(&group, &consumer);
            w.stream_start(StreamPart::ConsumerPendingList);
            w.stream_consumer_pend(&consumer, &ConsPendInfo { id: id1, index: 1, count: 1 });
            w.stream_end(StreamPart::ConsumerPendingList);
            w.stream_end(StreamPart::Consumer);
            w.stream_end(StreamPart::ConsumerList);
            w.stream_end(StreamPart::Group);
            w.stream_end(StreamPart::GroupList);
            w.end_key();
            w.finish(true);
        });
        assert_eq!(
            got,
            concat!(
                "{\n",
                "\"st\" : {\n",
                "  \"entries\" : [\n",
                "    { \"id\" : \"1-0\", \"f1\" : \"v1\" },\n",
                "    { \"id\" : \"2-0\", \"f1\" : 7 } ],\n",
                "  \"last_id\" : \"2-0\",\n",
                "  \"num_elems\" : 2,\n",
                "  \"num_cgroups\" : 1,\n",
                "  \"groups\" : [\n",
                "    { \"group\" : \"grp\", \"pending\" : 1, \"last_id\" : \"2-0\",\n",
                "    \"pel\" : [\n",
                "        { \"id\" : \"1-0\", \"last_d\" : 111, \"d_cnt\" : 2 } ],\n",
                "      \"consumers\" : [\n",
                "        { \"name\" : \"c1\", \"pending\" : 1, \"last_seen\" : 222,\n",
                "        \"pel\" : [\n",
                "          \"1-0\" ] } ] } ]\n",
                "}\n",
                "}\n"
            )
        );
    }

    struct Failing;

    impl std::io::Write for Failing {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_latch() {
        let mut w = JsonWriter::new(Failing);
        w.begin();
        w.start_type(RecordType::String, 9);
        w.start_key(&s(b"k"));
        w.string(&s(b"v"));
        w.end_key();
        w.finish(true);
        assert!(w.into_inner().is_err());
    }
}
