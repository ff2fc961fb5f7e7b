use std::fs;
use std::path::{Path, PathBuf};

/// Represents a video4linux device node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Node {
    path: PathBuf,
}

impl Node {
    /// Returns a device node observer by path
    ///
    /// # Arguments
    ///
    /// * `path` - Node path (usually a character device)
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::device::Node;
    /// let node = Node::new("/dev/video0");
    /// assert_eq!(node.index(), Some(0));
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Node {
            path: PathBuf::from(path.as_ref()),
        }
    }

    /// Returns the absolute path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the index of the device node, i.e. the trailing number of its file name
    pub fn index(&self) -> Option<usize> {
        let file_name = self.path.file_name()?.to_str()?;
        let digits = file_name
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;

        file_name[digits..].parse::<usize>().ok()
    }

    /// Returns name of the device by parsing its sysfs entry
    pub fn name(&self) -> Option<String> {
        let index = self.index()?;
        let path = format!("/sys/class/video4linux/video{}/name", index);
        fs::read_to_string(path)
            .ok()
            .map(|name| name.trim().to_string())
    }
}

/// Returns a list of video device nodes currently known to the system, sorted by path
///
/// Nodes are not opened; use [`crate::Device::with_path`] to probe them.
///
/// # Example
///
/// ```
/// use v4l_capture::device;
/// for node in device::enum_devices() {
///     println!("{}: {:?}", node.path().display(), node.name());
/// }
/// ```
pub fn enum_devices() -> Vec<Node> {
    let mut devices = Vec::new();

    let entries = match fs::read_dir("/dev") {
        Ok(entries) => entries,
        Err(_) => return devices,
    };

    for dentry in entries.flatten() {
        let file_name = dentry.file_name();
        let is_video = file_name
            .to_str()
            .map_or(false, |name| name.starts_with("video"));

        if is_video {
            devices.push(Node::new(dentry.path()));
        }
    }

    devices.sort();
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_trailing_number() {
        assert_eq!(Node::new("/dev/video12").index(), Some(12));
        assert_eq!(Node::new("/dev/video").index(), None);
        assert_eq!(Node::new("/dev/v4l/by-id/cam-video-index1").index(), Some(1));
    }
}
