use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Moves the cursor back to the beginning of the line before the cursor. A newline right before
/// the cursor terminates that line and is skipped.
pub async fn seek_line_backwards(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<(), io::Error> {
    let mut need_to_skip = 1usize;
    loop {
        let leftover = file.stream_position().await?;
        if leftover == 0 {
            return Ok(());
        }
        let next_chunk = u64::min(leftover, buffer.len() as u64) as usize;
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;

        file.read_exact(&mut buffer[..next_chunk]).await?;
        let newline = buffer[..next_chunk]
            .iter()
            .rev()
            .enumerate()
            .skip(need_to_skip)
            .find(|(_, value)| **value == b'\n');
        if let Some((index, _)) = newline {
            file.seek(std::io::SeekFrom::Current(-(index as i64)))
                .await?;
            return Ok(());
        }

        need_to_skip = need_to_skip.saturating_sub(next_chunk);
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;
    }
}

/// Last line of a file without its line terminator. Empty for an empty file.
pub async fn read_last_line(file: &mut (impl AsyncSeek + AsyncRead + Unpin)) -> io::Result<String> {
    file.seek(std::io::SeekFrom::End(0)).await?;
    seek_line_backwards(file, &mut [0; 1024]).await?;
    let mut last_line = String::new();
    file.read_to_string(&mut last_line).await?;
    Ok(last_line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use tempfile::tempfile;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use super::{read_last_line, seek_line_backwards};

    const ROWS: &str = "timestamp,process_name\n\
                        2024-05-06 09:30:00,code\n\
                        2024-05-06 09:30:05,chrome.exe\n";

    fn file_with(content: &str) -> Result<tokio::fs::File> {
        let mut file = tempfile()?;
        file.write_all(content.as_bytes())?;
        Ok(tokio::fs::File::from_std(file))
    }

    fn line_starts(content: &str) -> Vec<u64> {
        content
            .bytes()
            .enumerate()
            .filter(|v| v.1 == b'\n')
            .map(|v| v.0 as u64 + 1)
            .collect()
    }

    #[tokio::test]
    async fn walks_back_line_by_line() -> Result<()> {
        let starts = line_starts(ROWS);
        for buffer_size in [2, 1024] {
            let mut file = file_with(ROWS)?;
            file.seek(std::io::SeekFrom::End(0)).await?;

            seek_line_backwards(&mut file, &mut vec![0; buffer_size]).await?;
            assert_eq!(file.stream_position().await?, starts[1]);
            seek_line_backwards(&mut file, &mut vec![0; buffer_size]).await?;
            assert_eq!(file.stream_position().await?, starts[0]);
            seek_line_backwards(&mut file, &mut vec![0; buffer_size]).await?;
            assert_eq!(file.stream_position().await?, 0);
            seek_line_backwards(&mut file, &mut vec![0; buffer_size]).await?;
            assert_eq!(file.stream_position().await?, 0);
        }
        Ok(())
    }

    #[tokio::test]
    async fn returns_to_start_of_line_just_read() -> Result<()> {
        let starts = line_starts(ROWS);
        let mut file = file_with(ROWS)?;
        file.seek(std::io::SeekFrom::Start(starts[0])).await?;
        let mut line = vec![0; (starts[1] - starts[0]) as usize];
        file.read_exact(&mut line).await?;
        assert_eq!(line, b"2024-05-06 09:30:00,code\n");

        seek_line_backwards(&mut file, &mut [0; 1024]).await?;
        assert_eq!(file.stream_position().await?, starts[0]);
        Ok(())
    }

    #[tokio::test]
    async fn reads_last_line() -> Result<()> {
        assert_eq!(
            read_last_line(&mut file_with(ROWS)?).await?,
            "2024-05-06 09:30:05,chrome.exe"
        );
        assert_eq!(read_last_line(&mut file_with("only")?).await?, "only");
        assert_eq!(read_last_line(&mut file_with("")?).await?, "");
        Ok(())
    }
}
