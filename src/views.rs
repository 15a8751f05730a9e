use crate::detection::DetectionRecord;

const STYLE: &str = "body{font-family:sans-serif;max-width:56rem;margin:2rem auto;padding:0 1rem}\
nav a{margin-right:1rem}\
table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #ddd;padding:.5rem;text-align:left}\
img.thumb{max-width:96px;max-height:96px}\
#result{margin-top:1rem}";

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <nav><a href=\"/\">Upload</a><a href=\"/history\">History</a></nav>\n\
         {body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

pub fn index_page() -> String {
    page(
        "Banana Ripeness Detection",
        r#"<h1>Banana Ripeness Detection</h1>
<form id="upload" enctype="multipart/form-data">
  <input type="file" name="image" accept=".png,.jpg,.jpeg,.gif" required>
  <button type="submit">Classify</button>
</form>
<div id="result"></div>
<script>
document.getElementById('upload').addEventListener('submit', async (event) => {
  event.preventDefault();
  const result = document.getElementById('result');
  result.textContent = 'Classifying...';
  const response = await fetch('/predict', { method: 'POST', body: new FormData(event.target) });
  const data = await response.json();
  result.replaceChildren();
  if (data.error) {
    result.textContent = data.error;
    return;
  }
  const label = document.createElement('p');
  label.textContent = data.prediction + ' (' + (data.confidence * 100).toFixed(1) + '%)';
  const image = document.createElement('img');
  image.src = data.image_url;
  image.className = 'thumb';
  result.append(label, image);
});
</script>"#,
    )
}

/// Public URL of a stored image.
fn image_link(image_path: &str) -> String {
    let name = image_path
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(image_path);
    format!("/uploads/{name}")
}

pub fn history_page(records: &[DetectionRecord]) -> String {
    let mut body = String::from("<h1>Detection History</h1>\n");

    if records.is_empty() {
        body.push_str("<p>No detections yet.</p>\n");
    }

    body.push_str(
        "<table>\n<thead><tr><th>Time</th><th>Class</th><th>Ripe</th><th>Unripe</th><th>Overripe</th>\
         <th>Image</th><th></th></tr></thead>\n<tbody>\n",
    );
    for record in records {
        let class = record.ripeness().map_or("Unknown", |ripeness| ripeness.display_name());
        body.push_str(&format!(
            "<tr><td>{time}</td><td>{class}</td><td>{ripe}</td><td>{unripe}</td><td>{overripe}</td>\
             <td><img class=\"thumb\" src=\"{src}\" alt=\"{alt}\"></td>\
             <td><form method=\"post\" action=\"/delete/{id}\">\
             <button type=\"submit\">Delete</button></form></td></tr>\n",
            time = record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            ripe = record.ripe,
            unripe = record.unripe,
            overripe = record.overripe,
            src = escape_html(&image_link(&record.image_path)),
            alt = escape_html(&record.image_path),
            id = record.id,
        ));
    }
    body.push_str("</tbody>\n</table>");

    page("Detection History", &body)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn record(id: i64, image_path: &str) -> DetectionRecord {
        DetectionRecord {
            id,
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_milli_opt(9, 30, 15, 250)
                .unwrap(),
            ripe: 1,
            unripe: 0,
            overripe: 0,
            image_path: image_path.to_string(),
        }
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn empty_history_renders_an_empty_table() {
        let html = history_page(&[]);
        assert!(html.contains("No detections yet."));
        assert!(html.contains("<tbody>\n</tbody>"));
    }

    #[test]
    fn history_rows_link_images_and_delete_forms() {
        let html = history_page(&[record(7, "static/uploads/ripe<1>.jpg")]);

        assert!(html.contains("2024-05-01 09:30:15"));
        assert!(html.contains("<td>Ripe</td>"));
        assert!(html.contains("action=\"/delete/7\""));
        assert!(html.contains("src=\"/uploads/ripe&lt;1&gt;.jpg\""));
        assert!(!html.contains("No detections yet."));
    }

    #[test]
    fn index_posts_image_field_to_predict() {
        let html = index_page();
        assert!(html.contains("name=\"image\""));
        assert!(html.contains("fetch('/predict'"));
    }
}
