//! Shared fixtures for the engine benchmarks.

/// A request fixture and the pool block size it is buffered with.
///
/// A block size smaller than the request spreads it over several buffer segments, which
/// exercises the parser's cross-segment path.
#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    file: TestFile,
    block_size: usize,
}

impl TestCase {
    pub const CONTIGUOUS: usize = 16 * 1024;

    pub fn new(name: &'static str, file: TestFile, block_size: usize) -> Self {
        Self { name, file, block_size }
    }

    pub fn contiguous(name: &'static str, file: TestFile) -> Self {
        Self::new(name, file, Self::CONTIGUOUS)
    }

    pub fn segmented(name: &'static str, file: TestFile, block_size: usize) -> Self {
        Self::new(name, file, block_size)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_segmented(&self) -> bool {
        self.block_size < self.file.content.len()
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    content: &'static [u8],
}

impl TestFile {
    pub const fn new(file_name: &'static str, content: &'static [u8]) -> Self {
        Self { file_name, content }
    }

    pub fn content(&self) -> &'static [u8] {
        self.content
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }

    /// Header lines between the request line and the blank line.
    pub fn header_lines(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        let text = std::str::from_utf8(self.content).unwrap_or_default();
        text.split("\r\n").skip(1).take_while(|line| !line.is_empty()).filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name, value.trim()))
        })
    }
}
