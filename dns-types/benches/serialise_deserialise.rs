use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dns_types::protocol::types::{DomainName, Message, Question, RecordClass, RecordType};

fn sample_message() -> Message {
    let name = DomainName::from_dotted_string("www.example.com").unwrap();
    let mut message = Message::query(
        1,
        Question {
            name: name.clone(),
            qtype: RecordType::A,
            qclass: RecordClass::IN,
        },
    );
    message.answers.push(dns_types::protocol::types::ResourceRecord::a(
        name,
        300,
        "93.184.216.34".parse().unwrap(),
    ));
    message
}

fn bench_serialise(c: &mut Criterion) {
    let message = sample_message();
    c.bench_function("serialise", |b| {
        b.iter(|| black_box(&message).to_octets());
    });
}

fn bench_deserialise(c: &mut Criterion) {
    let octets = sample_message().to_octets();
    c.bench_function("deserialise", |b| {
        b.iter(|| Message::from_octets(black_box(&octets)).unwrap());
    });
}

criterion_group!(benches, bench_serialise, bench_deserialise);
criterion_main!(benches);
