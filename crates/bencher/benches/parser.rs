use std::hint::black_box;

use bencher::{TestCase, TestFile};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_engine::buffer::{MemoryPool, PipeOptions, PipeReader, PipeWriter, pipe};
use micro_engine::codec::{HeaderBudget, HeadersHandler, HttpParser, RequestLineHandler, StartLine};
use micro_engine::protocol::BadRequest;

static SMALL_HEADER: TestFile = TestFile::new("get_small.txt", include_bytes!("../resources/request/get_small.txt"));
static LARGE_HEADER: TestFile = TestFile::new("get_large.txt", include_bytes!("../resources/request/get_large.txt"));

const MAX_REQUEST_LINE_SIZE: usize = 8 * 1024;
const MAX_REQUEST_HEADER_COUNT: usize = 100;
const MAX_REQUEST_HEADERS_TOTAL_SIZE: usize = 32 * 1024;

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::contiguous("small_header", SMALL_HEADER),
        TestCase::contiguous("large_header", LARGE_HEADER),
        TestCase::segmented("large_header_segmented", LARGE_HEADER, 256),
    ]
}

/// Counts what the parser hands out, so the work can't be optimized away.
#[derive(Debug, Default)]
struct Sink {
    target_len: usize,
    headers: usize,
    header_bytes: usize,
}

impl RequestLineHandler for Sink {
    fn on_start_line(&mut self, line: StartLine<'_>) -> Result<(), BadRequest> {
        self.target_len = line.target.len();
        Ok(())
    }
}

impl HeadersHandler for Sink {
    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), BadRequest> {
        self.headers += 1;
        self.header_bytes += name.len() + value.len();
        Ok(())
    }

    fn on_headers_complete(&mut self) -> Result<(), BadRequest> {
        Ok(())
    }
}

fn buffered(case: &TestCase) -> (PipeWriter, PipeReader) {
    let (mut writer, reader) = pipe(MemoryPool::new(case.block_size()), PipeOptions::unbounded());
    writer.put_slice(case.file().content());
    writer.commit();
    (writer, reader)
}

fn benchmark_request_parser(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_parser");

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::new("micro_engine", case.name()), &case, |b, case| {
            let (_writer, mut reader) = buffered(case);
            let result = reader.try_read().expect("pipe should be readable").expect("request should be buffered");
            let buffer = result.buffer();
            let mut parser = HttpParser::new();

            b.iter(|| {
                let mut sink = Sink::default();
                let line = parser
                    .parse_request_line(&mut sink, buffer, MAX_REQUEST_LINE_SIZE)
                    .expect("input should be a valid request line");
                let mut budget = HeaderBudget::new(MAX_REQUEST_HEADER_COUNT, MAX_REQUEST_HEADERS_TOTAL_SIZE);
                let headers = parser
                    .parse_headers(&mut sink, buffer, line.consumed, &mut budget)
                    .expect("input should be valid request headers");
                assert!(headers.done);
                black_box(sink)
            });
        });

        if case.is_segmented() {
            continue;
        }
        group.bench_with_input(BenchmarkId::new("httparse", case.name()), &case, |b, case| {
            let content = case.file().content();
            b.iter(|| {
                let mut headers = [httparse::EMPTY_HEADER; MAX_REQUEST_HEADER_COUNT];
                let mut request = httparse::Request::new(&mut headers);
                let status = request.parse(black_box(content)).expect("input should be a valid request");
                black_box((status.is_complete(), request.headers.len()))
            });
        });
    }

    group.finish();
}

criterion_group!(parser, benchmark_request_parser);
criterion_main!(parser);
