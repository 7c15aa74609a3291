use axum::response::Html;

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
  <head><title>Upload a File</title></head>
  <body>
    <h2>Upload a File</h2>
    <form action="/upload" method="post" enctype="multipart/form-data">
      <input type="file" name="file" /><br/><br/>
      <input type="submit" value="Upload File" />
    </form>
  </body>
</html>
"#;

pub async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}
